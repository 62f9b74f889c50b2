//! Chat endpoints — session lifecycle and the turn handler.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;

use crate::advisor::tracker::missing_from;
use crate::advisor::types::ParameterField;
use crate::ratelimit::OperationClass;

use super::{ok, validate_session_id, ApiError, AppState};

/// Greeting returned with a freshly opened session.
const WELCOME: &str = "Hi! I'm your loan advisor. Tell me a little about the \
                       loan you're looking for and I'll find lenders that fit.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub session_id: String,
    pub message: String,
}

/// `POST /api/chat/session` — open a fresh session.
pub async fn open_session(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let ip = addr.ip().to_string();
    state.limiter.check(OperationClass::General, &ip)?;

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let session = {
        let store = lock(&state)?;
        store.open_session(user_agent, Some(&ip))?
    };

    tracing::info!(session = %session.id, "session opened");
    Ok(ok(json!({
        "sessionId": session.id,
        "expiresAt": session.expires_at,
        "message": WELCOME,
    })))
}

/// `POST /api/chat/message` — one chat turn.
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    validate_session_id(&request.session_id)?;
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError(crate::advisor::AdvisorError::Validation {
            field: "message".into(),
            reason: "must not be empty".into(),
        }));
    }
    state
        .limiter
        .check(OperationClass::Chat, &request.session_id)?;

    let result = state
        .orchestrator
        .handle_turn(&request.session_id, message)
        .await?;

    let mut data = json!({
        "response": result.reply,
        "action": result.action,
        "completionPercentage": result.completion_percent,
        "sessionId": result.session_id,
    });
    if let Some(matches) = result.matches {
        data["matches"] = json!(matches);
    }
    Ok(ok(data))
}

/// `GET /api/chat/history/{sessionId}` — full transcript plus a summary.
pub async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    validate_session_id(&session_id)?;
    state.limiter.check(OperationClass::General, &session_id)?;

    let (session, messages, tracking) = {
        let store = lock(&state)?;
        let session = store.require_usable(&session_id)?;
        let messages = store.get_history(&session_id)?;
        let tracking = store.get_tracking(&session_id)?;
        (session, messages, tracking)
    };

    let collected: Vec<&str> = ParameterField::REQUIRED
        .iter()
        .filter(|f| tracking.is_collected(**f))
        .map(|f| f.as_str())
        .collect();
    let duration_minutes = (session.last_activity - session.created_at).num_minutes();
    let message_count = messages.len();

    Ok(ok(json!({
        "sessionId": session_id,
        "messages": messages,
        "summary": {
            "messageCount": message_count,
            "durationMinutes": duration_minutes,
            "parametersCollected": collected,
            "lastActivity": session.last_activity,
        },
    })))
}

/// `DELETE /api/chat/session/{sessionId}` — close a session.
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    validate_session_id(&session_id)?;

    {
        let store = lock(&state)?;
        store.require_usable(&session_id)?;
        store.close(&session_id)?;
    }

    tracing::info!(session = %session_id, "session closed");
    Ok(ok(json!({
        "sessionId": session_id,
        "status": "ended",
    })))
}

/// Used by handlers below and in `loan.rs`: a short-scope store lock.
pub(super) fn lock(
    state: &AppState,
) -> Result<std::sync::MutexGuard<'_, crate::advisor::SessionStore>, ApiError> {
    crate::advisor::tracker::lock_store(&state.store).map_err(ApiError)
}

// Re-exported for the status endpoint's missing-field list.
pub(super) fn missing_names(tracking: &crate::advisor::types::ParameterTracking) -> Vec<&'static str> {
    missing_from(tracking).iter().map(|f| f.as_str()).collect()
}
