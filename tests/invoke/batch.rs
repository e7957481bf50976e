use super::support::{quick_config, single_service, Reply, ScriptedRemote};
use bytes::Bytes;
use invoke_guard::{
    Invocation, Invoker, RemoteError, RemoteRequest, ServiceRegistry, DEFAULT_BATCH_CONCURRENCY,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn results_keep_input_order() {
    // later slides answer faster
    let remote = tower::service_fn(|req: RemoteRequest| async move {
        let slide = req.parameters["slide"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(200 - slide * 10)).await;
        Ok::<_, RemoteError>(Bytes::from(format!("slide {slide}")))
    });
    let mut registry = ServiceRegistry::new();
    registry
        .register("llm", &quick_config(), Arc::new(remote))
        .unwrap();
    let invoker = Invoker::builder(registry).build();

    let jobs = (0..12).map(|i| Invocation::new("llm", "slide_text", json!({ "slide": i })));
    let results = invoker.invoke_batch(jobs, 4).await;

    let bodies: Vec<String> = results
        .into_iter()
        .map(|r| String::from_utf8(r.unwrap().to_vec()).unwrap())
        .collect();
    let expected: Vec<String> = (0..12).map(|i| format!("slide {i}")).collect();
    assert_eq!(bodies, expected);
}

#[tokio::test(start_paused = true)]
async fn never_exceeds_the_window() {
    let remote = ScriptedRemote::always(Reply::Slow(Duration::from_millis(100), "img"));
    let invoker = single_service("images", &quick_config(), &remote);

    let jobs = (0..20).map(|i| Invocation::new("images", "illustrate", json!({ "n": i })));
    let results = invoker.invoke_batch(jobs, DEFAULT_BATCH_CONCURRENCY).await;

    assert_eq!(results.len(), 20);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(remote.calls(), 20);
    assert_eq!(remote.peak_concurrency(), DEFAULT_BATCH_CONCURRENCY);
}

#[tokio::test(start_paused = true)]
async fn failures_stay_in_their_slot() {
    let remote = ScriptedRemote::always(Reply::Ok("fine"));
    let invoker = single_service("llm", &quick_config(), &remote);

    let jobs = vec![
        Invocation::new("llm", "a", json!(1)),
        Invocation::new("video", "render", json!(2)),
        Invocation::new("llm", "a", json!(3)),
    ];
    let results = invoker.invoke_batch(jobs, 2).await;

    assert!(results[0].is_ok());
    assert!(matches!(
        &results[1],
        Err(invoke_guard::InvokeError::UnknownService(id)) if id == "video"
    ));
    assert!(results[2].is_ok());
}

#[tokio::test(start_paused = true)]
async fn zero_concurrency_still_makes_progress() {
    let remote = ScriptedRemote::always(Reply::Ok("fine"));
    let invoker = single_service("llm", &quick_config(), &remote);

    let jobs = (0..3).map(|i| Invocation::new("llm", "a", json!(i)));
    let results = invoker.invoke_batch(jobs, 0).await;
    assert_eq!(results.len(), 3);
    assert_eq!(remote.peak_concurrency(), 1);
}
