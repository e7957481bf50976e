use bytes::Bytes;
use invoke_guard::{Cache, Clock, Fingerprint, MockClock};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: the fingerprint does not depend on object key order
    #[test]
    fn fingerprint_ignores_key_order(
        entries in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 1..12),
    ) {
        let forward: Map<String, Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();
        let backward: Map<String, Value> = entries
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();

        let a = Fingerprint::of("svc", "op", &Value::Object(forward));
        let b = Fingerprint::of("svc", "op", &Value::Object(backward));
        prop_assert_eq!(a.as_str(), b.as_str());
        prop_assert_eq!(a.as_str().len(), 64);
    }

    /// Property: service and operation are part of the key
    #[test]
    fn fingerprint_separates_services(service in "[a-z]{1,8}", operation in "[a-z]{1,8}") {
        let params = serde_json::json!({ "q": 1 });
        let base = Fingerprint::of(&service, &operation, &params);
        let other = Fingerprint::of(&format!("{service}x"), &operation, &params);
        prop_assert_ne!(base.as_str(), other.as_str());
    }

    /// Property: an entry is visible exactly while now < expires_at
    #[test]
    fn entry_visible_only_before_expiry(ttl_secs in 1u64..10_000, elapsed in 0u64..20_000) {
        let rt = super::paused_runtime();
        rt.block_on(async {
            let clock = Arc::new(MockClock::default());
            let cache = Cache::builder()
                .clock(Arc::clone(&clock) as Arc<dyn Clock>)
                .build();
            let key = Fingerprint::of("svc", "op", &Value::Null);

            cache
                .put(&key, Bytes::from_static(b"v"), Duration::from_secs(ttl_secs))
                .await;
            clock.advance(Duration::from_secs(elapsed));

            let visible = cache.get(&key).await.is_some();
            prop_assert_eq!(visible, elapsed < ttl_secs);
            Ok(())
        })?;
    }
}
