//! Advisor core error types.

use thiserror::Error;

use crate::llm::LlmError;

/// Errors that can occur during advisor core operations.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Caller-supplied data failed a domain check. Never retried.
    #[error("invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// No session with this id exists.
    #[error("session not found: '{session_id}'")]
    SessionNotFound { session_id: String },

    /// The session exists but is past expiry or no longer active.
    #[error("session expired: '{session_id}'")]
    SessionExpired { session_id: String },

    /// A rate-limit bucket was exceeded.
    #[error("rate limit exceeded for bucket '{bucket}'")]
    RateLimited { bucket: String },

    /// Database operation failed.
    #[error("database error: {reason}")]
    Database { reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// The gateway failed in a way the orchestrator does not absorb.
    #[error("llm gateway error: {0}")]
    Llm(#[from] LlmError),

    /// A scoring run could not be completed.
    #[error("matching failed: {reason}")]
    MatchingFailed { reason: String },

    /// Invariant violation. Logged with full context, surfaced opaquely.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl From<rusqlite::Error> for AdvisorError {
    fn from(e: rusqlite::Error) -> Self {
        AdvisorError::Database {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AdvisorError {
    fn from(e: serde_json::Error) -> Self {
        AdvisorError::Serialization {
            reason: e.to_string(),
        }
    }
}
