use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use std::net::SocketAddr;

use super::{session_metadata, with_token_cookies};
use crate::{
    dtos::auth::{MfaSetupRequest, MfaVerifyRequest},
    utils::ValidatedJson,
    AppState,
};

/// Start TOTP enrollment with a setup temp token
#[utoipa::path(
    post,
    path = "/mfa/setup",
    request_body = MfaSetupRequest,
    responses(
        (status = 200, description = "Enrollment material", body = MfaSetupResponse),
        (status = 401, description = "Invalid temp token", body = ErrorResponse)
    ),
    tag = "MFA"
)]
pub async fn mfa_setup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<MfaSetupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.mfa.setup(&req.temp_token).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Complete the second factor with a TOTP or backup code
#[utoipa::path(
    post,
    path = "/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "MFA-verified session issued", body = TokenResponse),
        (status = 401, description = "Invalid verification code", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = ErrorResponse)
    ),
    tag = "MFA"
)]
pub async fn mfa_verify(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<MfaVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let metadata = session_metadata(&headers, peer);
    let tokens = state
        .mfa
        .verify(&req.temp_token, &req.code, metadata)
        .await?;

    let jar = with_token_cookies(jar, &tokens, &state.config);
    Ok((StatusCode::OK, jar, Json(tokens)))
}
