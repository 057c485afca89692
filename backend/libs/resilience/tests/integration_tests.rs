/// Integration tests for resilience library
use resilience::{
    call_with_config, presets,
    retry::{with_retry, RetryConfig, RetryError},
    timeout::{with_timeout, TimeoutConfig, TimeoutError},
    ServiceConfig,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, PartialEq)]
enum StoreError {
    Unavailable,
    Timeout,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<TimeoutError> for StoreError {
    fn from(_: TimeoutError) -> Self {
        StoreError::Timeout
    }
}

// ==================== Retry Tests ====================

#[tokio::test]
async fn test_retry_recovers_flaky_upstream() {
    let config = RetryConfig {
        max_retries: 4,
        initial_backoff: Duration::from_millis(5),
        jitter: false,
        ..Default::default()
    };
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry(&config, move || {
        let count = counter_clone.fetch_add(1, Ordering::SeqCst);
        async move {
            if count < 3 {
                Err(StoreError::Unavailable)
            } else {
                Ok("points")
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), "points");
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

// ==================== Timeout Tests ====================

#[tokio::test]
async fn test_timeout_guards_hanging_call() {
    let result = with_timeout(Duration::from_millis(10), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    assert!(matches!(result, Err(TimeoutError::Elapsed(_))));
}

// ==================== Policy Tests ====================

#[tokio::test]
async fn test_policy_surfaces_exhaustion_as_last_error() {
    let config = ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_millis(10),
        },
        retry: Some(RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }),
    };

    let result = call_with_config(
        &config,
        || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, StoreError>(())
        },
        |_| true,
    )
    .await;

    match result {
        Err(err @ RetryError::Exhausted { .. }) => {
            assert!(err.is_exhausted());
            assert_eq!(err.into_inner(), StoreError::Timeout);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_preset_policy_succeeds_first_try() {
    let result = call_with_config(
        &presets::embedding_config(),
        || async { Ok::<_, StoreError>(vec![1.0_f32]) },
        |e| *e == StoreError::Unavailable,
    )
    .await;

    assert_eq!(result.unwrap(), vec![1.0]);
}
