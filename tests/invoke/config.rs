use super::support::{Reply, ScriptedRemote};
use invoke_guard::{ConfigError, InvokeError, Invoker, InvokerConfig, RemoteCall};
use serde_json::json;
use std::sync::Arc;

const CONFIG: &str = r#"{
    "max_entries": 100,
    "sweep_interval_seconds": 30,
    "services": {
        "llm": {
            "cache_ttl_seconds": 600,
            "retry_max_attempts": 2,
            "retry_base_delay_ms": 10,
            "retry_max_delay_ms": 10,
            "retry_jitter_fraction": 0.0
        },
        "images": {
            "rate_limit_capacity": 2,
            "rate_limit_refill_per_second": 0.0,
            "breaker_failure_threshold": 1
        }
    }
}"#;

fn remotes(llm: &ScriptedRemote, images: &ScriptedRemote) -> Vec<(String, Arc<dyn RemoteCall>)> {
    vec![
        ("llm".to_string(), llm.as_remote()),
        ("images".to_string(), images.as_remote()),
    ]
}

#[tokio::test(start_paused = true)]
async fn builds_every_configured_service() {
    let llm = ScriptedRemote::always(Reply::Fail(503));
    let images = ScriptedRemote::always(Reply::Ok("png"));
    let config = InvokerConfig::from_json(CONFIG).unwrap();
    let invoker = Invoker::from_config(&config, remotes(&llm, &images))
        .await
        .unwrap();

    assert_eq!(invoker.registry().ids(), vec!["images", "llm"]);

    let err = invoker.invoke("llm", "complete", json!({})).await.unwrap_err();
    assert!(matches!(err, InvokeError::RetriesExhausted { attempts: 2, .. }));

    invoker.invoke("images", "a", json!(1)).await.unwrap();
    invoker.invoke("images", "a", json!(2)).await.unwrap();
    assert!(invoker
        .invoke("images", "a", json!(3))
        .await
        .unwrap_err()
        .is_rate_limited());
}

#[tokio::test]
async fn missing_remote_is_a_config_error() {
    let llm = ScriptedRemote::always(Reply::Ok("x"));
    let config = InvokerConfig::from_json(CONFIG).unwrap();
    let err = Invoker::from_config(&config, vec![("llm".to_string(), llm.as_remote())])
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingRemote(id) if id == "images"));
}

#[test]
fn invalid_service_config_is_rejected() {
    let err = InvokerConfig::from_json(
        r#"{ "services": { "llm": { "retry_jitter_fraction": 2.0 } } }"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid {
            field: "retry_jitter_fraction",
            ..
        }
    ));
}

#[tokio::test]
async fn persisted_cache_survives_a_new_invoker() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = InvokerConfig::from_json(CONFIG).unwrap();
    config.persist_dir = Some(dir.path().to_path_buf());

    let first_llm = ScriptedRemote::always(Reply::Ok("generated once"));
    let images = ScriptedRemote::always(Reply::Ok("png"));
    let first = Invoker::from_config(&config, remotes(&first_llm, &images))
        .await
        .unwrap();
    first.invoke("llm", "outline", json!({ "topic": "rust" })).await.unwrap();
    drop(first);

    // a fresh process would see the same directory
    let second_llm = ScriptedRemote::always(Reply::Ok("generated twice"));
    let second = Invoker::from_config(&config, remotes(&second_llm, &images))
        .await
        .unwrap();
    let body = second
        .invoke("llm", "outline", json!({ "topic": "rust" }))
        .await
        .unwrap();

    assert_eq!(body, "generated once");
    assert_eq!(second_llm.calls(), 0);
}

#[tokio::test]
async fn corrupt_persisted_record_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = InvokerConfig::from_json(CONFIG).unwrap();
    config.persist_dir = Some(dir.path().to_path_buf());

    let llm = ScriptedRemote::always(Reply::Ok("fresh"));
    let images = ScriptedRemote::always(Reply::Ok("png"));
    let first = Invoker::from_config(&config, remotes(&llm, &images))
        .await
        .unwrap();
    first.invoke("llm", "outline", json!(1)).await.unwrap();
    drop(first);

    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|e| e == "json") {
            std::fs::write(&path, b"{ not json").unwrap();
        }
    }

    let second = Invoker::from_config(&config, remotes(&llm, &images))
        .await
        .unwrap();
    assert_eq!(second.invoke("llm", "outline", json!(1)).await.unwrap(), "fresh");
    assert_eq!(llm.calls(), 2);
}
