use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{SessionValidateRequest, SessionValidateResponse},
    AppState,
};

/// Session liveness for the edge gate
///
/// Protected by the shared `x-internal-secret` header; never routed publicly.
#[utoipa::path(
    post,
    path = "/internal/sessions/validate",
    request_body = SessionValidateRequest,
    responses(
        (status = 200, description = "Session status", body = SessionValidateResponse),
        (status = 401, description = "Missing or wrong internal secret", body = ErrorResponse)
    ),
    tag = "Internal",
    security(("internal_secret" = []))
)]
pub async fn validate_session(
    State(state): State<AppState>,
    Json(req): Json<SessionValidateRequest>,
) -> Result<Json<SessionValidateResponse>, AppError> {
    let status = state.guard.validate_session(req.sid).await?;
    tracing::debug!(session_id = %req.sid, status = ?status, "Session validated");

    Ok(Json(SessionValidateResponse {
        valid: status.is_valid(),
        reason: status.reason().map(str::to_string),
    }))
}
