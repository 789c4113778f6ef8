use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditEvent, AuditEventType, SessionMetadata, User};
use crate::services::{
    metrics, AuditLogger, AuthError, CredentialStore, LoginThrottle, MfaChallenge,
    MfaChallengeEngine, RefreshRotationEngine, TokenResponse,
};
use crate::utils::{verify_password_async, Password, PasswordHashString};

/// Result of a successful password check.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(TokenResponse),
    MfaRequired(MfaChallenge),
}

/// Password login and logout on top of rotation and MFA.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    rotation: RefreshRotationEngine,
    mfa: MfaChallengeEngine,
    throttle: LoginThrottle,
    audit: AuditLogger,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        rotation: RefreshRotationEngine,
        mfa: MfaChallengeEngine,
        throttle: LoginThrottle,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            rotation,
            mfa,
            throttle,
            audit,
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: Password,
        tenant_id: Option<Uuid>,
        metadata: SessionMetadata,
    ) -> Result<LoginOutcome, AuthError> {
        let throttle_key = LoginThrottle::password_key(tenant_id, email);
        if let Err(e) = self.throttle.begin_attempt(&throttle_key).await {
            tracing::warn!(email = %email, "Login throttled");
            self.audit.record(
                AuditEvent::new(AuditEventType::LoginThrottled)
                    .with_tenant(tenant_id)
                    .with_ip(metadata.ip_address.clone()),
            );
            metrics::record_auth_event("login", "throttled");
            return Err(e);
        }

        let candidates = self.store.find_users_by_email(email.trim(), tenant_id).await?;
        let user = match check_password(candidates, password).await {
            Ok(user) => user,
            Err((reason, user)) => {
                self.login_failed(reason, tenant_id, user.as_ref(), &metadata);
                return Err(AuthError::InvalidCredentials);
            }
        };
        self.throttle.clear(&throttle_key).await;

        if let Some(reason) = user.unavailable_reason() {
            self.login_failed(reason, tenant_id, Some(&user), &metadata);
            return Err(AuthError::AccountUnavailable);
        }

        if let Some(challenge) = self.mfa.challenge(&user)? {
            metrics::record_auth_event("login", "mfa_required");
            return Ok(LoginOutcome::MfaRequired(challenge));
        }

        let ip_address = metadata.ip_address.clone();
        let tokens = self.rotation.start_session(&user, metadata).await?;

        tracing::info!(user_id = %user.user_id, tenant_id = %user.tenant_id, "Login succeeded");
        self.audit.record(
            AuditEvent::new(AuditEventType::LoginSucceeded)
                .with_user(user.tenant_id, user.user_id)
                .with_ip(ip_address),
        );
        metrics::record_auth_event("login", "success");

        Ok(LoginOutcome::Authenticated(tokens))
    }

    /// Revoke the session behind `refresh_token`. Unknown tokens are ignored.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
            self.rotation.revoke(token).await?;
        }
        metrics::record_auth_event("logout", "success");
        Ok(())
    }

    fn login_failed(
        &self,
        reason: &'static str,
        tenant_id: Option<Uuid>,
        user: Option<&User>,
        metadata: &SessionMetadata,
    ) {
        tracing::warn!(
            reason = reason,
            user_id = ?user.map(|u| u.user_id),
            "Login failed"
        );
        let event = match user {
            Some(u) => AuditEvent::new(AuditEventType::LoginFailed).with_user(u.tenant_id, u.user_id),
            None => AuditEvent::new(AuditEventType::LoginFailed).with_tenant(tenant_id),
        };
        self.audit.record(
            event
                .with_ip(metadata.ip_address.clone())
                .with_data(serde_json::json!({ "reason": reason })),
        );
        metrics::record_auth_event("login", "failure");
    }
}

/// The single candidate whose password matches.
///
/// On failure returns the audit reason and the user if one was found.
async fn check_password(
    mut candidates: Vec<User>,
    password: Password,
) -> Result<User, (&'static str, Option<User>)> {
    // Without a tenant hint an email shared by several tenants is ambiguous.
    let user = match candidates.len() {
        0 => return Err(("unknown_email", None)),
        1 => candidates.remove(0),
        _ => return Err(("ambiguous_tenant", None)),
    };

    let Some(hash) = user.password_hash.clone() else {
        return Err(("invite_pending", Some(user)));
    };

    match verify_password_async(password, PasswordHashString::new(hash)).await {
        Ok(true) => Ok(user),
        Ok(false) => Err(("wrong_password", Some(user))),
        Err(e) => {
            tracing::error!(user_id = %user.user_id, error = %e, "Stored password hash unusable");
            Err(("bad_password_hash", Some(user)))
        }
    }
}
