use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::auth::RevokeSessionsResponse,
    middleware::AuthUser,
    models::{permission, User, UserResponse},
    services::{AuthError, AuthenticatedUser},
    AppState,
};

/// Current principal as carried by the access token
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Authenticated principal", body = AuthenticatedUser),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn get_me(user: AuthUser) -> impl IntoResponse {
    Json(user.0)
}

/// Look up a user in the caller's tenant
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 403, description = "Missing USER_VIEW", body = ErrorResponse),
        (status = 404, description = "No such user in this tenant", body = ErrorResponse)
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    principal.require_permission(permission::USER_VIEW)?;
    let user = tenant_user(&state, &principal, user_id).await?;
    Ok(Json(user.sanitized()))
}

/// Revoke every session of a user
#[utoipa::path(
    post,
    path = "/users/{id}/sessions/revoke",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Sessions revoked", body = RevokeSessionsResponse),
        (status = 403, description = "Missing USER_MANAGE", body = ErrorResponse),
        (status = 404, description = "No such user in this tenant", body = ErrorResponse)
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn revoke_user_sessions(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require_permission(permission::USER_MANAGE)?;
    let user = tenant_user(&state, &principal, user_id).await?;

    let revoked = state.rotation.revoke_all(&user).await?;
    tracing::info!(
        actor_id = %principal.user_id,
        user_id = %user.user_id,
        revoked = revoked,
        "Sessions revoked by administrator"
    );

    Ok((StatusCode::OK, Json(RevokeSessionsResponse { revoked })))
}

/// Clear a user's second factor and force re-enrollment
#[utoipa::path(
    post,
    path = "/users/{id}/mfa/reset",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "MFA reset, sessions revoked", body = RevokeSessionsResponse),
        (status = 403, description = "Missing USER_MANAGE", body = ErrorResponse),
        (status = 404, description = "No such user in this tenant", body = ErrorResponse)
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn reset_user_mfa(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require_permission(permission::USER_MANAGE)?;
    let user = tenant_user(&state, &principal, user_id).await?;

    let revoked = state.mfa.reset(&user).await?;
    tracing::info!(
        actor_id = %principal.user_id,
        user_id = %user.user_id,
        "MFA reset by administrator"
    );

    Ok((StatusCode::OK, Json(RevokeSessionsResponse { revoked })))
}

/// Users outside the caller's tenant are reported as missing.
async fn tenant_user(
    state: &AppState,
    principal: &AuthenticatedUser,
    user_id: Uuid,
) -> Result<User, AuthError> {
    state
        .store
        .find_user_by_id(user_id)
        .await?
        .filter(|user| user.tenant_id == principal.tenant_id)
        .ok_or(AuthError::NotFound("User not found"))
}
