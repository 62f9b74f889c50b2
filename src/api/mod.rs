//! HTTP API — a thin axum router over the advisor core.
//!
//! Handlers validate input, apply rate limits, call into the core, and wrap
//! every response in the shared envelope `{success, data?, error?,
//! message?}`. No business logic lives here.
//!
//! Submodules:
//! - `chat`: session lifecycle and the chat turn endpoint
//! - `loan`: parameter status/updates, matching, results, catalogue
//! - `health`: liveness and dependency status

pub mod chat;
pub mod health;
pub mod loan;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::{Uuid, Version};

use crate::advisor::{AdvisorError, Orchestrator, SessionStore};
use crate::config::AppConfig;
use crate::llm::TextGenerator;
use crate::ratelimit::RateLimiter;
use crate::scoring::{LenderCatalogue, ScoringEngine};

/// Maximum accepted request body.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ─── State ──────────────────────────────────────────────────────────────────

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<SessionStore>>,
    pub orchestrator: Arc<Orchestrator>,
    pub engine: Arc<ScoringEngine>,
    pub catalogue: Arc<LenderCatalogue>,
    pub limiter: Arc<RateLimiter>,
    pub gateway: Arc<dyn TextGenerator>,
    pub started_at: Instant,
}

// ─── Envelope ───────────────────────────────────────────────────────────────

/// The response envelope every endpoint shares.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 200 with data.
pub fn ok(data: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }),
    )
        .into_response()
}

// ─── Error Mapping ──────────────────────────────────────────────────────────

/// Wrapper that turns core errors into enveloped HTTP responses.
pub struct ApiError(pub AdvisorError);

impl From<AdvisorError> for ApiError {
    fn from(e: AdvisorError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self.0 {
            AdvisorError::Validation { field, reason } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("{field}: {reason}"),
            ),
            AdvisorError::SessionNotFound { .. } => (
                StatusCode::NOT_FOUND,
                "session_not_found",
                "session not found".to_string(),
            ),
            AdvisorError::SessionExpired { .. } => (
                StatusCode::UNAUTHORIZED,
                "session_expired",
                "session has expired".to_string(),
            ),
            AdvisorError::RateLimited { bucket } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                format!("too many requests: {bucket}"),
            ),
            AdvisorError::Database { .. } | AdvisorError::Llm(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "a dependency is unavailable, please retry".to_string(),
            ),
            AdvisorError::MatchingFailed { .. }
            | AdvisorError::Serialization { .. }
            | AdvisorError::Internal { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "something went wrong".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }

        (
            status,
            Json(Envelope {
                success: false,
                data: None,
                error: Some(error.to_string()),
                message: Some(message),
            }),
        )
            .into_response()
    }
}

/// Validate a session id as a version-4 UUID before it touches the store.
pub fn validate_session_id(raw: &str) -> Result<(), ApiError> {
    let parsed = Uuid::parse_str(raw).map_err(|_| {
        ApiError(AdvisorError::Validation {
            field: "sessionId".into(),
            reason: "must be a UUIDv4".into(),
        })
    })?;
    if parsed.get_version() != Some(Version::Random) {
        return Err(ApiError(AdvisorError::Validation {
            field: "sessionId".into(),
            reason: "must be a UUIDv4".into(),
        }));
    }
    Ok(())
}

// ─── Router ─────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn build_router(state: AppState, config: &AppConfig) -> Router {
    let cors = if config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .route("/api/chat/session", post(chat::open_session))
        .route("/api/chat/message", post(chat::send_message))
        .route("/api/chat/history/:session_id", get(chat::history))
        .route(
            "/api/chat/session/:session_id",
            axum::routing::delete(chat::end_session),
        )
        .route("/api/loan/status/:session_id", get(loan::status))
        .route("/api/loan/match", post(loan::match_lenders))
        .route("/api/loan/results/:session_id", get(loan::results))
        .route("/api/loan/parameters/:session_id", put(loan::update_parameter))
        .route("/api/loan/lenders", get(loan::lenders))
        .route("/api/health", get(health::health))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_session_id_accepts_v4() {
        let id = Uuid::new_v4().to_string();
        assert!(validate_session_id(&id).is_ok());
    }

    #[test]
    fn test_validate_session_id_rejects_garbage() {
        assert!(validate_session_id("not-a-uuid").is_err());
        assert!(validate_session_id("").is_err());
        // v1-style UUID (version nibble = 1) is not accepted.
        assert!(validate_session_id("c232ab00-9414-11ec-b3c8-9f6bdeced846").is_err());
    }

    #[test]
    fn test_envelope_omits_empty_fields() {
        let envelope = Envelope {
            success: true,
            data: Some(serde_json::json!({"x": 1})),
            error: None,
            message: None,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("error"));
        assert!(!json.contains("message"));
        assert!(json.contains("\"success\":true"));
    }
}
