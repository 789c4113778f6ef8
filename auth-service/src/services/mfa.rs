//! Step-up MFA between password verification and session issuance.
//!
//! A user with `mfa_enabled` or `mfa_setup_required` never receives a session
//! from the password check alone. They get a temp token, which only the
//! endpoints here accept, and trade it plus a TOTP or backup code for a
//! session that replaces all of their existing ones.

use rand::RngCore;
use serde::Serialize;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use utoipa::ToSchema;

use crate::config::MfaConfig;
use crate::models::{AuditEvent, AuditEventType, SessionMetadata, User};
use crate::services::jwt::{TempTokenClaims, TempTokenPurpose};
use crate::services::{
    metrics, AuditLogger, AuthError, Clock, CredentialStore, JwtService, LoginThrottle,
    RefreshRotationEngine, SessionReplacement, TokenResponse,
};
use crate::utils::{hash_backup_code, BackupCodeBatch};

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP_SECONDS: u64 = 30;
const TOTP_SECRET_BYTES: usize = 20;

/// What a submitted code turned out to be.
enum SecondFactor {
    Rejected,
    Totp,
    /// Hash of a well-formed backup code, still to be matched by the store.
    BackupCode(String),
}

/// Temp token handed out instead of a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MfaChallenge {
    pub mfa_required: bool,
    pub setup_required: bool,
    pub temp_token: String,
}

/// Enrollment material, shown once.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MfaSetupResponse {
    /// Base32 TOTP secret for manual entry
    pub secret: String,
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
}

#[derive(Clone)]
pub struct MfaChallengeEngine {
    store: Arc<dyn CredentialStore>,
    jwt: JwtService,
    rotation: RefreshRotationEngine,
    throttle: LoginThrottle,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
    config: MfaConfig,
}

/// Build the TOTP verifier for a stored base32 secret.
pub fn totp_for(secret_base32: &str, issuer: &str, account: &str) -> Result<TOTP, anyhow::Error> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| anyhow::anyhow!("Invalid TOTP secret: {}", e))?;
    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP_SECONDS,
        secret,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| anyhow::anyhow!("TOTP init error: {}", e))
}

fn is_totp_shaped(code: &str) -> bool {
    code.len() == TOTP_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

impl MfaChallengeEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        jwt: JwtService,
        rotation: RefreshRotationEngine,
        throttle: LoginThrottle,
        clock: Arc<dyn Clock>,
        audit: AuditLogger,
        config: MfaConfig,
    ) -> Self {
        Self {
            store,
            jwt,
            rotation,
            throttle,
            clock,
            audit,
            config,
        }
    }

    /// The temp token for a password-verified user, or `None` when no second
    /// factor is involved.
    pub fn challenge(&self, user: &User) -> Result<Option<MfaChallenge>, AuthError> {
        if !user.needs_second_factor() {
            return Ok(None);
        }

        // Enrollment wins: after an admin reset the user has no usable factor.
        let purpose = if user.mfa_setup_required {
            TempTokenPurpose::MfaSetupPending
        } else {
            TempTokenPurpose::MfaPending
        };

        let temp_token = self.jwt.sign_temp(
            user.user_id,
            user.tenant_id,
            &user.email,
            purpose,
            self.clock.now(),
        )?;

        tracing::info!(user_id = %user.user_id, purpose = ?purpose, "MFA challenge issued");
        self.audit.record(
            AuditEvent::new(AuditEventType::MfaChallengeIssued)
                .with_user(user.tenant_id, user.user_id)
                .with_data(serde_json::json!({ "purpose": purpose })),
        );

        Ok(Some(MfaChallenge {
            mfa_required: true,
            setup_required: purpose == TempTokenPurpose::MfaSetupPending,
            temp_token,
        }))
    }

    /// Generate a TOTP secret and backup codes for a setup-pending user.
    pub async fn setup(&self, temp_token: &str) -> Result<MfaSetupResponse, AuthError> {
        let (claims, user) = self.load_challenge(temp_token).await?;
        if claims.purpose != TempTokenPurpose::MfaSetupPending || !user.mfa_setup_required {
            tracing::warn!(user_id = %user.user_id, "MFA setup attempted without pending enrollment");
            return Err(AuthError::MfaVerificationFailed);
        }

        let mut secret_bytes = vec![0u8; TOTP_SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let totp = TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(self.config.totp_issuer.clone()),
            user.email.clone(),
        )
        .map_err(|e| anyhow::anyhow!("TOTP init error: {}", e))?;

        let secret = totp.get_secret_base32();
        let batch = BackupCodeBatch::generate(self.config.backup_code_count);

        self.store
            .store_mfa_enrollment(user.user_id, &secret, &batch.code_hashes, self.clock.now())
            .await?;

        tracing::info!(user_id = %user.user_id, "MFA enrollment started");
        self.audit.record(
            AuditEvent::new(AuditEventType::MfaEnrollmentStarted)
                .with_user(user.tenant_id, user.user_id),
        );

        Ok(MfaSetupResponse {
            otpauth_url: totp.get_url(),
            secret,
            backup_codes: batch.codes,
        })
    }

    /// Check the second factor and, on success, replace all of the user's
    /// sessions with one MFA-verified session.
    ///
    /// A backup code is burned in the same store write that installs the new
    /// session, so a failed write leaves the code usable.
    pub async fn verify(
        &self,
        temp_token: &str,
        code: &str,
        metadata: SessionMetadata,
    ) -> Result<TokenResponse, AuthError> {
        let (claims, mut user) = self.load_challenge(temp_token).await?;
        let throttle_key = LoginThrottle::mfa_key(user.user_id);
        self.throttle.begin_attempt(&throttle_key).await?;

        let completing_enrollment = claims.purpose == TempTokenPurpose::MfaSetupPending;
        let state_matches = if completing_enrollment {
            user.mfa_setup_required
        } else {
            user.mfa_enabled && !user.mfa_setup_required
        };

        let factor = if state_matches {
            self.check_code(&user, code, completing_enrollment)?
        } else {
            SecondFactor::Rejected
        };
        let backup_code_hash = match &factor {
            SecondFactor::Rejected => return Err(self.verification_failed(&user, &metadata)),
            SecondFactor::Totp => None,
            SecondFactor::BackupCode(hash) => Some(hash.as_str()),
        };

        if completing_enrollment {
            user.mfa_enabled = true;
            user.mfa_setup_required = false;
        }

        let now = self.clock.now();
        let (session, refresh) = self.rotation.new_session(&user, true, metadata, now);
        let access_token = self.rotation.mint_access_token(&user, &session, now).await?;

        let replacement = SessionReplacement {
            session: &session,
            complete_enrollment: completing_enrollment,
            backup_code_hash,
        };
        let Some(revoked) = self
            .store
            .replace_user_sessions(user.user_id, replacement, now)
            .await?
        else {
            return Err(self.verification_failed(&user, &session.metadata()));
        };
        self.throttle.clear(&throttle_key).await;

        if backup_code_hash.is_some() {
            tracing::info!(user_id = %user.user_id, "Backup code used");
            self.audit.record(
                AuditEvent::new(AuditEventType::BackupCodeUsed)
                    .with_user(user.tenant_id, user.user_id),
            );
        }

        tracing::info!(
            user_id = %user.user_id,
            session_id = %session.session_id,
            revoked,
            enrollment_completed = completing_enrollment,
            "MFA verified"
        );
        self.audit.record(
            AuditEvent::new(AuditEventType::MfaVerified)
                .with_user(user.tenant_id, user.user_id)
                .with_ip(session.ip_address.clone())
                .with_data(serde_json::json!({
                    "revoked_sessions": revoked,
                    "enrollment_completed": completing_enrollment,
                })),
        );
        metrics::record_auth_event("mfa_verify", "success");

        Ok(self.rotation.token_response(&user, access_token, refresh))
    }

    fn verification_failed(&self, user: &User, metadata: &SessionMetadata) -> AuthError {
        tracing::warn!(user_id = %user.user_id, "MFA verification failed");
        self.audit.record(
            AuditEvent::new(AuditEventType::MfaFailed)
                .with_user(user.tenant_id, user.user_id)
                .with_ip(metadata.ip_address.clone()),
        );
        metrics::record_auth_event("mfa_verify", "failure");
        AuthError::MfaVerificationFailed
    }

    /// Admin-forced reset: clear MFA material, require re-enrollment and
    /// sign the user out everywhere.
    pub async fn reset(&self, user: &User) -> Result<u64, AuthError> {
        let revoked = self.store.reset_mfa(user.user_id, self.clock.now()).await?;

        tracing::info!(user_id = %user.user_id, revoked, "MFA reset");
        self.audit.record(
            AuditEvent::new(AuditEventType::MfaReset)
                .with_user(user.tenant_id, user.user_id)
                .with_data(serde_json::json!({ "revoked_sessions": revoked })),
        );
        Ok(revoked)
    }

    async fn load_challenge(&self, temp_token: &str) -> Result<(TempTokenClaims, User), AuthError> {
        let claims = self.jwt.verify_temp(temp_token, self.clock.now())?;
        if !matches!(
            claims.purpose,
            TempTokenPurpose::MfaPending | TempTokenPurpose::MfaSetupPending
        ) {
            return Err(AuthError::MfaVerificationFailed);
        }

        match self.store.find_user_by_id(claims.sub).await? {
            Some(user) if user.tenant_id == claims.tenant_id && user.can_authenticate() => {
                Ok((claims, user))
            }
            _ => Err(AuthError::MfaVerificationFailed),
        }
    }

    /// TOTP first; backup codes only outside enrollment. Nothing is spent
    /// here, a backup code is only matched by hash later.
    fn check_code(
        &self,
        user: &User,
        code: &str,
        completing_enrollment: bool,
    ) -> Result<SecondFactor, AuthError> {
        let code = code.trim();
        let Some(secret) = user.mfa_secret.as_deref() else {
            return Ok(SecondFactor::Rejected);
        };

        if is_totp_shaped(code) {
            let totp = totp_for(secret, &self.config.totp_issuer, &user.email)?;
            let now = self.clock.now().timestamp().max(0) as u64;
            return Ok(if totp.check(code, now) {
                SecondFactor::Totp
            } else {
                SecondFactor::Rejected
            });
        }

        if completing_enrollment {
            return Ok(SecondFactor::Rejected);
        }

        Ok(hash_backup_code(code).map_or(SecondFactor::Rejected, SecondFactor::BackupCode))
    }
}
