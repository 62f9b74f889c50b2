//! Loan endpoints — parameter status and updates, matching, results, and
//! the lender catalogue.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::advisor::types::ParameterField;
use crate::advisor::AdvisorError;
use crate::ratelimit::OperationClass;
use crate::scoring::DEFAULT_TOP_K;

use super::chat::{lock, missing_names};
use super::{ok, validate_session_id, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateParameterRequest {
    pub parameter: String,
    pub value: serde_json::Value,
}

/// `GET /api/loan/status/{sessionId}` — collection progress.
pub async fn status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    validate_session_id(&session_id)?;
    state.limiter.check(OperationClass::General, &session_id)?;

    let (parameters, tracking) = {
        let store = lock(&state)?;
        store.require_usable(&session_id)?;
        (
            store.get_parameters(&session_id)?,
            store.get_tracking(&session_id)?,
        )
    };

    Ok(ok(json!({
        "completionPercentage": tracking.completion_percent,
        "collectedParameters": parameters,
        "missingParameters": missing_names(&tracking),
        "tracking": tracking,
        "isComplete": tracking.is_complete(),
    })))
}

/// `POST /api/loan/match` — run matching for a complete profile.
pub async fn match_lenders(
    State(state): State<AppState>,
    Json(request): Json<MatchRequest>,
) -> Result<Response, ApiError> {
    validate_session_id(&request.session_id)?;
    state
        .limiter
        .check(OperationClass::Matching, &request.session_id)?;

    let (parameters, tracking) = {
        let store = lock(&state)?;
        store.require_usable(&request.session_id)?;
        (
            store.get_parameters(&request.session_id)?,
            store.get_tracking(&request.session_id)?,
        )
    };

    if !tracking.is_complete() {
        return Err(ApiError(AdvisorError::Validation {
            field: "parameters".into(),
            reason: format!(
                "profile incomplete — still missing: {}",
                missing_names(&tracking).join(", ")
            ),
        }));
    }

    let (matches, path) = state.engine.score(&parameters, DEFAULT_TOP_K)?;
    let calculated_at = {
        let store = lock(&state)?;
        store.replace_matches(&request.session_id, &matches)?
    };

    tracing::info!(
        session = %request.session_id,
        matches = matches.len(),
        ?path,
        "matching run persisted"
    );

    let total = matches.len();
    Ok(ok(json!({
        "matches": matches,
        "totalMatches": total,
        "sessionId": request.session_id,
        "calculatedAt": calculated_at,
        "parameters": parameters,
    })))
}

/// `GET /api/loan/results/{sessionId}` — last persisted ranking.
pub async fn results(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    validate_session_id(&session_id)?;
    state.limiter.check(OperationClass::General, &session_id)?;

    let stored = {
        let store = lock(&state)?;
        store.require_usable(&session_id)?;
        store.get_matches(&session_id)?
    };

    let Some((matches, calculated_at)) = stored else {
        return Err(ApiError(AdvisorError::Validation {
            field: "sessionId".into(),
            reason: "no matching run has been performed for this session".into(),
        }));
    };

    let total = matches.len();
    Ok(ok(json!({
        "matches": matches,
        "totalMatches": total,
        "sessionId": session_id,
        "calculatedAt": calculated_at,
    })))
}

/// `PUT /api/loan/parameters/{sessionId}` — direct parameter update.
pub async fn update_parameter(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateParameterRequest>,
) -> Result<Response, ApiError> {
    validate_session_id(&session_id)?;
    state.limiter.check(OperationClass::General, &session_id)?;

    let Some(field) = ParameterField::parse(&request.parameter) else {
        return Err(ApiError(AdvisorError::Validation {
            field: request.parameter.clone(),
            reason: "unknown parameter".into(),
        }));
    };

    {
        let store = lock(&state)?;
        store.require_usable(&session_id)?;
    }

    let outcome = state
        .orchestrator
        .tracker()
        .set(&session_id, field, &request.value)?;

    Ok(ok(json!({
        "parameter": field.as_str(),
        "tracking": outcome.tracking,
        "completionPercentage": outcome.tracking.completion_percent,
        "isComplete": outcome.tracking.is_complete(),
    })))
}

/// `GET /api/loan/lenders` — the full catalogue.
pub async fn lenders(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(ok(json!({
        "lenders": state.catalogue.list(),
        "total": state.catalogue.len(),
    })))
}
