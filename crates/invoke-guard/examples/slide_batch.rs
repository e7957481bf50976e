//! Generates text and images for a small slide deck through the invoker.
//!
//! Both remote services are simulated: the text endpoint is slow, and the
//! image endpoint fails transiently every third request. Run with
//! `RUST_LOG=invoke_guard=debug` to watch cache hits, retries and breaker
//! transitions.

use bytes::Bytes;
use invoke_guard::{
    CallContext, Invocation, Invoker, RemoteError, RemoteRequest, ServiceConfig, ServiceRegistry,
    DEFAULT_BATCH_CONCURRENCY,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let text = tower::service_fn(|req: RemoteRequest| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let title = req.parameters["title"].as_str().unwrap_or("untitled");
        Ok::<_, RemoteError>(Bytes::from(format!("Bullet points about {title}")))
    });

    let image_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&image_calls);
    let images = tower::service_fn(move |req: RemoteRequest| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n % 3 == 2 {
                return Err(RemoteError::from_status(503, "image backend overloaded"));
            }
            Ok(Bytes::from(format!("png for {}", req.parameters["prompt"])))
        }
    });

    let text_config = ServiceConfig {
        cache_ttl_seconds: 600,
        ..Default::default()
    };
    let image_config = ServiceConfig {
        rate_limit_capacity: 50,
        rate_limit_refill_per_second: 50.0 / 3600.0,
        retry_base_delay_ms: 100,
        retry_max_delay_ms: 1_000,
        ..Default::default()
    };

    let mut registry = ServiceRegistry::new();
    registry
        .register("llm", &text_config, Arc::new(text))?
        .register("images", &image_config, Arc::new(images))?;
    let invoker = Invoker::builder(registry).build();

    let titles = ["Ownership", "Borrowing", "Lifetimes", "Traits", "Ownership"];
    let text_jobs = titles
        .iter()
        .map(|t| Invocation::new("llm", "slide_text", json!({ "title": t })));
    let image_jobs = titles
        .iter()
        .map(|t| Invocation::new("images", "illustrate", json!({ "prompt": format!("diagram of {t}") })));

    let ctx = CallContext::new().timeout(Duration::from_secs(30));
    let results = invoker
        .invoke_batch_with(text_jobs.chain(image_jobs), DEFAULT_BATCH_CONCURRENCY, &ctx)
        .await;

    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(body) => println!("{i:>2}: {}", String::from_utf8_lossy(body)),
            Err(e) => println!("{i:>2}: error: {e}"),
        }
    }

    let stats = invoker.stats();
    println!(
        "\ncache hit rate {:.0}%, {} remote calls, {} failed attempts",
        stats.cache_hit_rate() * 100.0,
        stats.remote_calls,
        stats.remote_failures
    );
    for service in invoker.health().services {
        println!(
            "{:<8} {:?} ({}), {:.1} tokens left",
            service.service_id, service.state, service.status, service.available_tokens
        );
    }
    Ok(())
}
