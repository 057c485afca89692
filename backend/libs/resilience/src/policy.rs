//! Timeout + retry composed into one call wrapper
use crate::presets::ServiceConfig;
use crate::retry::{with_retry_if, RetryConfig, RetryError};
use crate::timeout::{with_timeout_result, TimeoutError};
use std::future::Future;

/// Call an upstream operation under `config`.
///
/// Every attempt gets its own deadline. Elapsed deadlines are folded into `E` and go through
/// `is_transient` like any other failure. Without a retry config the call is attempted once.
pub async fn call_with_config<F, Fut, T, E, P>(
    config: &ServiceConfig,
    mut f: F,
    is_transient: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TimeoutError> + std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let deadline = config.timeout.duration;
    let retry = config.retry.clone().unwrap_or(RetryConfig {
        max_retries: 0,
        ..Default::default()
    });

    with_retry_if(&retry, || with_timeout_result(deadline, f()), is_transient).await
}
