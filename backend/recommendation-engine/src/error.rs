use crate::models::InteractionType;
use resilience::{RetryError, TimeoutError};
use std::time::Duration;
use thiserror::Error;

/// Failure reported by an upstream collaborator (vector store, embedding service, interaction log)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpstreamError {
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upstream rejected request: {0}")]
    InvalidRequest(String),

    #[error("Not found upstream: {0}")]
    NotFound(String),
}

impl UpstreamError {
    /// Only connectivity failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Unavailable(_) | UpstreamError::Timeout(_))
    }
}

impl From<TimeoutError> for UpstreamError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Elapsed(d) => UpstreamError::Timeout(d),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Seed has no items and no query text")]
    EmptySeed,

    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable {
        service: &'static str,
        message: String,
    },

    #[error("Malformed payload for item {item_id}: {reason}")]
    MalformedPayload { item_id: String, reason: String },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding space mismatch: profile built with {found}, engine uses {expected}")]
    EmbeddingSpaceMismatch { expected: String, found: String },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Interaction type {0} does not update profiles")]
    UnsupportedInteraction(InteractionType),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn upstream(service: &'static str, err: RetryError<UpstreamError>) -> Self {
        let message = match &err {
            RetryError::Exhausted { attempts, last } => {
                format!("{} (after {} attempts)", last, attempts)
            }
            RetryError::Permanent(e) => e.to_string(),
        };
        EngineError::UpstreamUnavailable { service, message }
    }

    /// Failures the engine can degrade around instead of surfacing
    pub fn is_upstream(&self) -> bool {
        matches!(self, EngineError::UpstreamUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
