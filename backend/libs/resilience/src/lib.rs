//! Resilience patterns for calls to upstream collaborators
//!
//! This library provides:
//! - **Timeout**: Enforces a deadline on every upstream call
//! - **Retry**: Bounded exponential backoff with jitter, only for transient failures
//! - **Policy**: Timeout and retry composed into a single call wrapper
//! - **Preset Configurations**: Pre-tuned settings for the vector store, embedding service
//!   and interaction log
//!
//! # Example: Vector store query with the preset policy
//!
//! ```rust,no_run
//! use resilience::{call_with_config, presets, TimeoutError};
//!
//! #[derive(Debug)]
//! enum StoreError {
//!     Unavailable,
//!     Timeout,
//! }
//!
//! impl std::fmt::Display for StoreError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl From<TimeoutError> for StoreError {
//!     fn from(_: TimeoutError) -> Self {
//!         StoreError::Timeout
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = presets::vector_store_config();
//!
//!     let result = call_with_config(
//!         &config,
//!         || async { Ok::<_, StoreError>(vec![0.1_f32, 0.2]) },
//!         |e| matches!(e, StoreError::Unavailable | StoreError::Timeout),
//!     )
//!     .await;
//! }
//! ```

pub mod policy;
pub mod presets;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use policy::call_with_config;
pub use presets::{embedding_config, interaction_log_config, vector_store_config, ServiceConfig};
pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
