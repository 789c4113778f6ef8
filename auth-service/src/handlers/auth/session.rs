use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use std::net::SocketAddr;

use super::{session_metadata, with_token_cookies, without_token_cookies, REFRESH_TOKEN_COOKIE};
use crate::{
    dtos::{auth::LoginRequest, auth::RefreshRequest, MessageResponse},
    services::LoginOutcome,
    utils::{OptionalJson, Password, ValidatedJson},
    AppState,
};

/// Login with email and password
///
/// Users with a second factor receive a temp token instead of a session.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued, or MFA challenge", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Response, AppError> {
    let metadata = session_metadata(&headers, peer);
    let outcome = state
        .auth_service
        .login(&req.email, Password::new(req.password), req.tenant_id, metadata)
        .await?;

    Ok(match outcome {
        LoginOutcome::Authenticated(tokens) => {
            let jar = with_token_cookies(jar, &tokens, &state.config);
            (StatusCode::OK, jar, Json(tokens)).into_response()
        }
        LoginOutcome::MfaRequired(challenge) => (StatusCode::OK, Json(challenge)).into_response(),
    })
}

/// Rotate the refresh token
#[utoipa::path(
    post,
    path = "/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 400, description = "No refresh token supplied", body = ErrorResponse),
        (status = 401, description = "Invalid refresh token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    OptionalJson(req): OptionalJson<RefreshRequest>,
) -> Result<Response, AppError> {
    let token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Refresh token is required")))?;

    let tokens = state.rotation.rotate(&token).await?;
    let jar = with_token_cookies(jar, &tokens, &state.config);
    Ok((StatusCode::OK, jar, Json(tokens)).into_response())
}

/// Logout and revoke the session
#[utoipa::path(
    post,
    path = "/logout",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Logged out successfully", body = MessageResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    OptionalJson(req): OptionalJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()));

    state.auth_service.logout(token.as_deref()).await?;

    Ok((
        StatusCode::OK,
        without_token_cookies(jar),
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}
