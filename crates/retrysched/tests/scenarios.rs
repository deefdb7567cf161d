//! End-to-end scenarios covering submission, retry, deadlines, delayed
//! starts, grace-window dispatch, and admission back-pressure.

use futures::future::FutureExt;
use retrysched_core::{SchedulerConfig, SchedulerError, WaitError};
use retrysched_executor::CurrentRuntime;
use retrysched_retry::{ExponentialAfterAttemptDecider, FixedInterval};
use retrysched::ServiceBuilder;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct AppError(String);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn config() -> SchedulerConfig {
    SchedulerConfig::builder()
        .thread_pool_size(4)
        .rate_limit_burst(100)
        .rate_limit(100, Duration::from_millis(10))
        .request_early_processing_grace_period(Duration::from_millis(20))
        .max_sleep_step(Duration::from_millis(20))
        .max_attempts(3)
        .build()
}

#[tokio::test]
async fn success_after_two_failures() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let service = ServiceBuilder::new(config(), CurrentRuntime::new(), move |_input: Arc<u32>, n: u32| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if n >= 3 {
                Ok::<_, AppError>(n)
            } else {
                Err(AppError(format!("attempt:{n}")))
            }
        }
        .boxed()
    })
    .after_decider(Arc::new(ExponentialAfterAttemptDecider::new(
        FixedInterval::new(Duration::from_millis(30)),
        3,
    )))
    .start();

    let handle = service.submit_for(1u32, Duration::from_secs(5)).unwrap();
    let result = handle.get().await.unwrap();
    assert_eq!(*result, 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_budget_exhausted_carries_the_last_cause() {
    let service = ServiceBuilder::new(config(), CurrentRuntime::new(), |_input: Arc<u32>, n: u32| {
        async move { Err::<u32, _>(AppError(format!("attempt:{n}"))) }.boxed()
    })
    .after_decider(Arc::new(ExponentialAfterAttemptDecider::new(
        FixedInterval::new(Duration::from_millis(20)),
        3,
    )))
    .start();

    let handle = service.submit_for(1u32, Duration::from_secs(5)).unwrap();
    let err = handle.get().await.unwrap_err();
    match err {
        WaitError::AttemptFailed(AppError(msg)) => assert!(msg.contains("attempt:3")),
        other => panic!("expected AttemptFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn deadline_hit_mid_retry_times_out_before_the_final_attempt() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let service = ServiceBuilder::new(config(), CurrentRuntime::new(), move |_input: Arc<u32>, n: u32| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(AppError(format!("attempt:{n}")))
        }
        .boxed()
    })
    .after_decider(Arc::new(ExponentialAfterAttemptDecider::new(
        FixedInterval::new(Duration::from_millis(200)),
        10,
    )))
    .start();

    let handle = service.submit_for(1u32, Duration::from_millis(120)).unwrap();
    let err = handle.get().await.unwrap_err();
    assert!(matches!(err, WaitError::RequestTimedOut));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn delayed_start_waits_for_not_before() {
    let service = ServiceBuilder::new(config(), CurrentRuntime::new(), |input: Arc<u32>, _n: u32| {
        async move { Ok::<u32, AppError>(*input) }.boxed()
    })
    .start();

    let start = Instant::now();
    let handle = service
        .submit_for_with_delay_for(7u32, Duration::from_secs(2), Duration::from_millis(150))
        .unwrap();
    let result = handle.get().await.unwrap();
    assert_eq!(*result, 7);
    assert!(start.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn within_grace_window_dispatches_directly_without_the_delay_queue() {
    let service = ServiceBuilder::new(config(), CurrentRuntime::new(), |input: Arc<u32>, _n: u32| {
        async move { Ok::<u32, AppError>(*input) }.boxed()
    })
    .start();

    let start = Instant::now();
    let handle = service
        .submit_for_with_delay_for(1u32, Duration::from_secs(2), Duration::from_millis(5))
        .unwrap();
    handle.get().await.unwrap();
    // Well within the 20ms grace period: should not wait on a delay-queue
    // drainer's polling granularity.
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn back_pressure_rejects_once_the_ceiling_is_reached() {
    let cfg = SchedulerConfig::builder()
        .thread_pool_size(2)
        .max_pending_requests(4)
        .rate_limit_burst(10)
        .max_sleep_step(Duration::from_millis(20))
        .build();
    let service = ServiceBuilder::new(cfg, CurrentRuntime::new(), |_input: Arc<u32>, _n: u32| {
        async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<u32, AppError>(0)
        }
        .boxed()
    })
    .start();

    let mut handles = Vec::new();
    for i in 0..4 {
        handles.push(
            service
                .submit_for_with_delay_for(i, Duration::from_secs(10), Duration::from_secs(5))
                .unwrap(),
        );
    }

    let rejected = service.submit_for_with_delay_for(99u32, Duration::from_secs(10), Duration::from_secs(5));
    assert!(matches!(
        rejected,
        Err(SchedulerError::TooManyPendingRequests { ceiling: 4 })
    ));

    for handle in handles {
        handle.request_cancellation();
    }

    // Once the delay-queue drainer observes the cancellations and drops the
    // entries, their slots in the admission ceiling must be freed again.
    let mut accepted = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if service
            .submit_for_with_delay_for(100u32, Duration::from_secs(10), Duration::from_secs(5))
            .is_ok()
        {
            accepted = true;
            break;
        }
    }
    assert!(accepted, "submission should succeed again after cancelled entries drain");
}
