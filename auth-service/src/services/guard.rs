//! Authoritative request authorization.

use chrono::Duration;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{AuditEvent, AuditEventType};
use crate::services::jwt::AccessTokenClaims;
use crate::services::{AuditLogger, AuthError, Clock, CredentialStore, JwtService};

/// Activity closer together than this is not written back to the session.
const ACTIVITY_RESOLUTION_SECONDS: i64 = 60;

/// A permission named either by numeric id or by code. Codes are canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionRef<'a> {
    Id(i32),
    Code(&'a str),
}

impl From<i32> for PermissionRef<'_> {
    fn from(id: i32) -> Self {
        PermissionRef::Id(id)
    }
}

impl<'a> From<&'a str> for PermissionRef<'a> {
    fn from(code: &'a str) -> Self {
        PermissionRef::Code(code)
    }
}

impl fmt::Display for PermissionRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionRef::Id(id) => write!(f, "#{}", id),
            PermissionRef::Code(code) => f.write_str(code),
        }
    }
}

/// Principal of an authorized request, built from verified claims.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub role_ids: Vec<Uuid>,
    pub permissions: Vec<String>,
    pub permission_ids: Vec<i32>,
    pub mfa_enabled: bool,
    pub session_id: Option<Uuid>,
    pub amr: Vec<String>,
    #[serde(skip)]
    pub token_id: Uuid,
    pub expires_at: i64,
}

impl AuthenticatedUser {
    fn from_claims(claims: AccessTokenClaims, tenant_id: Uuid) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id,
            email: claims.email,
            roles: claims.roles,
            role_ids: claims.role_ids,
            permissions: claims.permissions,
            permission_ids: claims.permission_ids,
            mfa_enabled: claims.mfa_enabled,
            session_id: claims.sid,
            amr: claims.amr,
            token_id: claims.jti,
            expires_at: claims.exp,
        }
    }

    pub fn has_permission<'a>(&self, permission: impl Into<PermissionRef<'a>>) -> bool {
        match permission.into() {
            PermissionRef::Id(id) => self.permission_ids.contains(&id),
            PermissionRef::Code(code) => self.permissions.iter().any(|p| p == code),
        }
    }

    /// Checks only the claims embedded at issuance.
    pub fn require_permission<'a>(
        &self,
        permission: impl Into<PermissionRef<'a>>,
    ) -> Result<(), AuthError> {
        let permission = permission.into();
        if self.has_permission(permission) {
            return Ok(());
        }
        tracing::warn!(
            user_id = %self.user_id,
            tenant_id = %self.tenant_id,
            required = %permission,
            "Permission denied"
        );
        Err(AuthError::Forbidden(permission.to_string()))
    }

    pub fn require_role(&self, role: &str) -> Result<(), AuthError> {
        if self.roles.iter().any(|r| r == role) {
            return Ok(());
        }
        tracing::warn!(
            user_id = %self.user_id,
            tenant_id = %self.tenant_id,
            required_role = %role,
            "Role denied"
        );
        Err(AuthError::Forbidden(format!("role {}", role)))
    }
}

/// Liveness of the session behind an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    /// Revoked, but recently enough that in-flight requests still pass.
    RevokedWithinGrace,
    Revoked,
    NotFound,
    UserMismatch,
}

impl SessionStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::RevokedWithinGrace)
    }

    /// Failure reason reported to internal callers.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            SessionStatus::Active | SessionStatus::RevokedWithinGrace => None,
            SessionStatus::Revoked => Some("revoked"),
            SessionStatus::NotFound => Some("not_found"),
            SessionStatus::UserMismatch => Some("user_mismatch"),
        }
    }
}

#[derive(Clone)]
pub struct AuthGuard {
    jwt: JwtService,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
    grace: Duration,
}

impl AuthGuard {
    pub fn new(
        jwt: JwtService,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        audit: AuditLogger,
        grace_seconds: i64,
    ) -> Self {
        Self {
            jwt,
            store,
            clock,
            audit,
            grace: Duration::seconds(grace_seconds),
        }
    }

    /// Verify a bearer token and the session it belongs to.
    pub async fn authorize(&self, bearer: Option<&str>) -> Result<AuthenticatedUser, AuthError> {
        let token = bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        let claims = self.jwt.verify_access(token, self.clock.now())?;

        let Some(tenant_id) = claims.tenant_id else {
            tracing::error!(
                user_id = %claims.sub,
                jti = %claims.jti,
                "Access token without tenant context rejected"
            );
            self.audit.record(
                AuditEvent::new(AuditEventType::TenantContextMissing).with_data(
                    serde_json::json!({ "user_id": claims.sub, "jti": claims.jti }),
                ),
            );
            return Err(AuthError::TenantContextMissing);
        };

        if let Some(sid) = claims.sid {
            let status = self.session_status(sid, Some(claims.sub)).await?;
            if !status.is_valid() {
                tracing::info!(
                    user_id = %claims.sub,
                    session_id = %sid,
                    status = ?status,
                    "Access token rejected for inactive session"
                );
                return Err(AuthError::SessionRevoked);
            }
        }

        Ok(AuthenticatedUser::from_claims(claims, tenant_id))
    }

    /// Liveness of a session known only by id, as asked by the edge gate.
    pub async fn validate_session(&self, session_id: Uuid) -> Result<SessionStatus, AuthError> {
        self.session_status(session_id, None).await
    }

    /// Session liveness alone, with the revocation grace window applied.
    pub async fn session_status(
        &self,
        session_id: Uuid,
        expected_user: Option<Uuid>,
    ) -> Result<SessionStatus, AuthError> {
        let Some(session) = self.store.find_session_by_id(session_id).await? else {
            return Ok(SessionStatus::NotFound);
        };

        if expected_user.is_some_and(|user_id| user_id != session.user_id) {
            tracing::error!(
                session_id = %session_id,
                session_user_id = %session.user_id,
                "Session does not belong to token subject"
            );
            return Ok(SessionStatus::UserMismatch);
        }

        let now = self.clock.now();
        Ok(match session.revoked_utc {
            None => {
                let idle = now - session.last_active_utc;
                if idle >= Duration::seconds(ACTIVITY_RESOLUTION_SECONDS) {
                    if let Err(e) = self.store.touch_session(session_id, now).await {
                        tracing::warn!(
                            session_id = %session_id,
                            error = %e,
                            "Failed to record session activity"
                        );
                    }
                }
                SessionStatus::Active
            }
            Some(revoked_at) if now - revoked_at < self.grace => {
                SessionStatus::RevokedWithinGrace
            }
            Some(_) => SessionStatus::Revoked,
        })
    }
}
