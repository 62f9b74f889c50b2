//! Gateway error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility — these types carry the context needed to
//! build meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the model endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The endpoint did not respond within the profile deadline.
    #[error("generation timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// The provider throttled the request (HTTP 429).
    #[error("rate limited by provider")]
    RateLimited,

    /// The account quota is exhausted (HTTP 402, or 403 with quota text).
    #[error("provider quota exhausted")]
    Quota,

    /// The request was rejected for a configuration reason (bad key, bad model).
    #[error("gateway configuration error: {reason}")]
    Config { reason: String },

    /// Non-2xx HTTP response not covered by a more specific kind.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The endpoint answered 2xx but the body carried no usable text.
    #[error("empty completion from model")]
    EmptyResponse,

    /// Anything the transport could not classify.
    #[error("unclassified gateway error: {reason}")]
    Unknown { reason: String },
}

impl LlmError {
    /// Classify a non-2xx response into the error taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => LlmError::RateLimited,
            402 => LlmError::Quota,
            403 if body.to_lowercase().contains("quota") => LlmError::Quota,
            400 | 401 | 404 | 422 => LlmError::Config {
                reason: format!("HTTP {status}: {body}"),
            },
            _ => LlmError::Http { status, body },
        }
    }

    /// True when the failure means the endpoint is unreachable or overloaded,
    /// as opposed to a request the caller built wrong.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            LlmError::ConnectionFailed { .. }
                | LlmError::Timeout { .. }
                | LlmError::RateLimited
                | LlmError::Quota
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limited() {
        assert!(matches!(
            LlmError::from_status(429, "slow down".into()),
            LlmError::RateLimited
        ));
    }

    #[test]
    fn test_classify_quota_from_402() {
        assert!(matches!(LlmError::from_status(402, "".into()), LlmError::Quota));
    }

    #[test]
    fn test_classify_quota_from_403_body() {
        assert!(matches!(
            LlmError::from_status(403, "monthly QUOTA exceeded".into()),
            LlmError::Quota
        ));
    }

    #[test]
    fn test_classify_config_errors() {
        for status in [400, 401, 404, 422] {
            assert!(matches!(
                LlmError::from_status(status, "bad".into()),
                LlmError::Config { .. }
            ));
        }
    }

    #[test]
    fn test_classify_server_error_falls_through() {
        assert!(matches!(
            LlmError::from_status(500, "boom".into()),
            LlmError::Http { status: 500, .. }
        ));
    }

    #[test]
    fn test_is_unavailable() {
        assert!(LlmError::RateLimited.is_unavailable());
        assert!(LlmError::Timeout { duration_secs: 10 }.is_unavailable());
        assert!(!LlmError::EmptyResponse.is_unavailable());
        assert!(!LlmError::Config { reason: "x".into() }.is_unavailable());
    }
}
