//! Submits a batch of requests against a deliberately flaky "endpoint"
//! (fails the first two attempts, then succeeds) and prints each result as
//! it completes.
//!
//! Run with: cargo run --example flaky_endpoint

use futures::future::FutureExt;
use rand::Rng;
use retrysched::{SchedulerConfig, ServiceBuilder};
use retrysched_executor::CurrentRuntime;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, thiserror::Error)]
#[error("endpoint unavailable on attempt {attempt}")]
struct EndpointError {
    attempt: u32,
}

async fn call_flaky_endpoint(key: Arc<String>, attempt: u32) -> Result<String, EndpointError> {
    let jitter_ms = rand::rng().random_range(5..30);
    tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
    if attempt < 3 {
        warn!(%key, attempt, "endpoint call failed");
        return Err(EndpointError { attempt });
    }
    Ok(format!("value-for-{key}"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = SchedulerConfig::builder()
        .service_name("flaky-endpoint-demo")
        .thread_pool_size(4)
        .rate_limit(20, Duration::from_millis(100))
        .rate_limit_burst(20)
        .max_attempts(5)
        .request_early_processing_grace_period(Duration::from_millis(10))
        .build();

    let service = ServiceBuilder::new(config, CurrentRuntime::new(), |key: Arc<String>, attempt: u32| {
        call_flaky_endpoint(key, attempt).boxed()
    })
    .start();

    let completed = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();
    for i in 0..8 {
        let key = format!("key-{i}");
        let handle = service
            .submit_for(key, Duration::from_secs(5))
            .expect("submission accepted");
        handles.push(handle);
    }

    for handle in handles {
        match handle.get().await {
            Ok(value) => {
                completed.fetch_add(1, Ordering::SeqCst);
                info!(%value, "request completed");
            }
            Err(err) => warn!(%err, "request did not complete"),
        }
    }

    info!(
        completed = completed.load(Ordering::SeqCst),
        status = ?service.get_status(Duration::from_millis(0)),
        "all requests settled"
    );

    service.shutdown(Duration::from_secs(1)).await;
}
