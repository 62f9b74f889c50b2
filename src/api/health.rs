//! Health endpoint — liveness plus dependency status.

use axum::extract::State;
use axum::response::Response;
use serde_json::json;

use super::{chat::lock, ok, ApiError, AppState};

/// `GET /api/health`.
pub async fn health(State(state): State<AppState>) -> Result<Response, ApiError> {
    let database_up = lock(&state).map(|store| store.ping()).unwrap_or(false);
    let llm_up = state.gateway.health_check().await;

    let status = if database_up && llm_up { "ok" } else { "degraded" };

    Ok(ok(json!({
        "status": status,
        "services": {
            "database": database_up,
            "llm": llm_up,
        },
        "uptime": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
