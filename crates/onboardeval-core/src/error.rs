//! Error types shared across the grading pipeline.
//!
//! `ProviderError` lives here rather than in `onboardeval-providers` so the
//! feedback synthesizer can downcast and classify model failures without
//! string matching.

use thiserror::Error;

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error will not go away by asking again.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }
}

/// Errors raised by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Errors surfaced by the grading entrypoint.
///
/// Model failures never appear here: they are recovered inside the
/// synthesizer. Progression failures never appear here either.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("submission {0} not found")]
    SubmissionNotFound(u64),

    #[error("assessment {0} not found")]
    AssessmentNotFound(u64),

    #[error("submission {id} is already {status}")]
    AlreadyGraded { id: u64, status: String },

    /// The submission was marked `failed`; the payload is what was persisted.
    #[error("grading failed for submission {id}: {reason}")]
    GradingFailed { id: u64, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// `true` for conditions a client should see as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::SubmissionNotFound(_) | EngineError::AssessmentNotFound(_)
        )
    }
}
