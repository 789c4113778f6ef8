//! Refresh token rotation.
//!
//! Every refresh token is single use: presenting it revokes its session and
//! creates exactly one successor in the same lineage. Access tokens minted on
//! the way always carry freshly resolved roles and permissions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::models::{AuditEvent, AuditEventType, Session, SessionMetadata, User, UserResponse};
use crate::services::jwt::{RefreshTokenPair, AMR_MFA, AMR_PASSWORD};
use crate::services::{
    metrics, AuditLogger, AuthError, Clock, CredentialStore, JwtService, PermissionResolver,
};

/// Token pair returned to clients
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Clone)]
pub struct RefreshRotationEngine {
    store: Arc<dyn CredentialStore>,
    jwt: JwtService,
    resolver: PermissionResolver,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
}

impl RefreshRotationEngine {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        jwt: JwtService,
        resolver: PermissionResolver,
        clock: Arc<dyn Clock>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            jwt,
            resolver,
            clock,
            audit,
        }
    }

    /// A new lineage head for `user` together with its raw refresh token.
    pub fn new_session(
        &self,
        user: &User,
        mfa_verified: bool,
        metadata: SessionMetadata,
        now: DateTime<Utc>,
    ) -> (Session, RefreshTokenPair) {
        let refresh = self.jwt.generate_refresh();
        let session = Session::new(
            user.user_id,
            refresh.hash.clone(),
            mfa_verified,
            metadata,
            now,
            self.jwt.refresh_token_expiry_days(),
        );
        (session, refresh)
    }

    /// Sign an access token bound to `session` with the user's current grants.
    pub async fn mint_access_token(
        &self,
        user: &User,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let roles = self.resolver.resolve_roles(user.user_id, user.tenant_id).await?;
        let permissions = self.resolver.resolve(user.user_id, user.tenant_id).await?;

        let amr: &[&str] = if session.mfa_verified {
            &[AMR_PASSWORD, AMR_MFA]
        } else {
            &[AMR_PASSWORD]
        };

        let claims = self.jwt.access_claims(
            user.user_id,
            user.tenant_id,
            &user.email,
            roles,
            permissions,
            user.mfa_enabled,
            session.session_id,
            amr,
            now,
        );
        Ok(self.jwt.sign_access(&claims)?)
    }

    pub fn token_response(
        &self,
        user: &User,
        access_token: String,
        refresh: RefreshTokenPair,
    ) -> TokenResponse {
        TokenResponse {
            access_token,
            refresh_token: refresh.raw,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            user: user.sanitized(),
        }
    }

    /// Open the first session of a lineage for a user who needs no second factor.
    pub async fn start_session(
        &self,
        user: &User,
        metadata: SessionMetadata,
    ) -> Result<TokenResponse, AuthError> {
        let now = self.clock.now();
        let (session, refresh) = self.new_session(user, false, metadata, now);
        let access_token = self.mint_access_token(user, &session, now).await?;

        self.store.insert_session(&session).await?;

        tracing::info!(
            user_id = %user.user_id,
            session_id = %session.session_id,
            "Session started"
        );
        Ok(self.token_response(user, access_token, refresh))
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// Unknown, revoked, expired and concurrently rotated tokens all fail
    /// with the same error.
    pub async fn rotate(&self, raw_refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let now = self.clock.now();
        let token_hash = crate::services::jwt::hash_token(raw_refresh_token);

        let parent = match self.store.find_live_session_by_hash(&token_hash, now).await? {
            Some(session) => session,
            None => {
                tracing::debug!("Refresh token does not match a live session");
                metrics::record_auth_event("refresh", "rejected");
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        let user = match self.store.find_user_by_id(parent.user_id).await? {
            Some(user) if user.can_authenticate() => user,
            other => {
                tracing::warn!(
                    user_id = %parent.user_id,
                    session_id = %parent.session_id,
                    reason = other.as_ref().and_then(|u| u.unavailable_reason()).unwrap_or("user_missing"),
                    "Refresh rejected for unavailable account"
                );
                self.audit.record(
                    AuditEvent::new(AuditEventType::RefreshRejected)
                        .with_tenant(other.as_ref().map(|u| u.tenant_id))
                        .with_data(serde_json::json!({ "reason": "account_unavailable" })),
                );
                metrics::record_auth_event("refresh", "rejected");
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        let refresh = self.jwt.generate_refresh();
        let successor =
            parent.successor(refresh.hash.clone(), now, self.jwt.refresh_token_expiry_days());
        let access_token = self.mint_access_token(&user, &successor, now).await?;

        if !self
            .store
            .rotate_session(parent.session_id, &successor, now)
            .await?
        {
            tracing::warn!(
                user_id = %user.user_id,
                session_id = %parent.session_id,
                "Concurrent rotation already consumed this refresh token"
            );
            metrics::record_auth_event("refresh", "rejected");
            return Err(AuthError::InvalidRefreshToken);
        }

        tracing::info!(
            user_id = %user.user_id,
            parent_session_id = %parent.session_id,
            session_id = %successor.session_id,
            "Refresh token rotated"
        );
        self.audit.record(
            AuditEvent::new(AuditEventType::TokenRefreshed)
                .with_user(user.tenant_id, user.user_id)
                .with_ip(successor.ip_address.clone()),
        );
        metrics::record_auth_event("refresh", "success");

        Ok(self.token_response(&user, access_token, refresh))
    }

    /// Revoke the session behind a refresh token without a successor.
    /// Returns whether a live session was revoked.
    pub async fn revoke(&self, raw_refresh_token: &str) -> Result<bool, AuthError> {
        let now = self.clock.now();
        let token_hash = crate::services::jwt::hash_token(raw_refresh_token);

        let Some(session) = self.store.find_live_session_by_hash(&token_hash, now).await? else {
            return Ok(false);
        };

        let revoked = self.store.revoke_session(session.session_id, now).await?;
        if revoked {
            tracing::info!(
                user_id = %session.user_id,
                session_id = %session.session_id,
                "Session revoked"
            );
            self.audit.record(
                AuditEvent::new(AuditEventType::SessionRevoked).with_data(serde_json::json!({
                    "session_id": session.session_id,
                    "user_id": session.user_id,
                })),
            );
        }
        Ok(revoked)
    }

    /// Revoke every live session of a user (admin-forced sign-out).
    pub async fn revoke_all(&self, user: &User) -> Result<u64, AuthError> {
        let revoked = self
            .store
            .revoke_user_sessions(user.user_id, self.clock.now())
            .await?;

        tracing::info!(user_id = %user.user_id, revoked, "All sessions revoked");
        self.audit.record(
            AuditEvent::new(AuditEventType::AllSessionsRevoked)
                .with_user(user.tenant_id, user.user_id)
                .with_data(serde_json::json!({ "revoked": revoked })),
        );
        Ok(revoked)
    }
}
