//! Preset configurations for the upstream collaborators of the recommendation engine
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a service type
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub retry: Option<RetryConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        vector_store_config()
    }
}

/// Vector store queries, retrieves and scrolls
///
/// - Timeout: 30s (MMR queries over large candidate pools can be slow)
/// - Retry: 3 attempts with exponential backoff (reads are idempotent)
pub fn vector_store_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(30),
        },
        retry: Some(RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

/// Embedding service (text or image to vector)
///
/// - Timeout: 10s (model inference)
/// - Retry: 2 attempts with longer initial backoff
pub fn embedding_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(10),
        },
        retry: Some(RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

/// Interaction log appends and reads
///
/// - Timeout: 5s
/// - No retry (appends are not idempotent, a retried append would record the event twice)
pub fn interaction_log_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(5),
        },
        retry: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_store_config() {
        let config = vector_store_config();
        assert_eq!(config.timeout.duration, Duration::from_secs(30));
        assert_eq!(config.retry.map(|r| r.max_retries), Some(3));
    }

    #[test]
    fn test_interaction_log_never_retries() {
        assert!(interaction_log_config().retry.is_none());
    }

    #[test]
    fn test_backoff_caps_stay_bounded() {
        for config in [vector_store_config(), embedding_config()] {
            let retry = config.retry.unwrap();
            assert!(retry.max_backoff <= Duration::from_secs(2));
            assert!(retry.initial_backoff < retry.max_backoff);
        }
    }
}
