use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::services::permissions::{PermissionSet, RoleSet};
use crate::services::AuthError;

/// Audience of access tokens accepted by the guard.
pub const ACCESS_AUDIENCE: &str = "access";
/// Audience of temp tokens accepted only by MFA operations.
pub const MFA_AUDIENCE: &str = "mfa";

const REFRESH_TOKEN_BYTES: usize = 32;

/// Authentication method references carried in `amr`.
pub const AMR_PASSWORD: &str = "pwd";
pub const AMR_MFA: &str = "mfa";

/// JWT service for token generation and validation
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
    temp_token_expiry_minutes: i64,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Absent only on malformed tokens; the guard fails closed on `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub role_ids: Vec<Uuid>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub permission_ids: Vec<i32>,
    #[serde(default)]
    pub mfa_enabled: bool,
    /// Session id, checked against the session record on every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amr: Vec<String>,
    pub aud: String,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// JWT ID
    pub jti: Uuid,
}

/// Why a temp token was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempTokenPurpose {
    MfaPending,
    MfaSetupPending,
    #[serde(other)]
    Unknown,
}

/// Claims for temp tokens bridging password verification and MFA.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempTokenClaims {
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub purpose: TempTokenPurpose,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Opaque refresh token as handed to the client, plus its stored hash.
#[derive(Debug, Clone)]
pub struct RefreshTokenPair {
    pub raw: String,
    pub hash: String,
}

impl JwtService {
    /// Create a new JWT service by loading RSA keys from files
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(&config.private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                config.private_key_path,
                e
            )
        })?;

        let public_key_pem = fs::read_to_string(&config.public_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                config.public_key_path,
                e
            )
        })?;

        Self::from_pem(private_key_pem.as_bytes(), public_key_pem.as_bytes(), config)
    }

    /// Create a JWT service from PEM encoded RSA keys
    pub fn from_pem(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        config: &JwtConfig,
    ) -> Result<Self, anyhow::Error> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;

        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        tracing::info!(issuer = %config.issuer, "JWT service initialized with RS256 keys");

        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: config.issuer.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
            temp_token_expiry_minutes: config.temp_token_expiry_minutes,
        })
    }

    /// Build access token claims expiring after the configured TTL
    #[allow(clippy::too_many_arguments)]
    pub fn access_claims(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        roles: RoleSet,
        permissions: PermissionSet,
        mfa_enabled: bool,
        sid: Uuid,
        amr: &[&str],
        now: DateTime<Utc>,
    ) -> AccessTokenClaims {
        AccessTokenClaims {
            sub: user_id,
            tenant_id: Some(tenant_id),
            email: email.to_string(),
            roles: roles.names,
            role_ids: roles.ids,
            permissions: permissions.codes,
            permission_ids: permissions.ids,
            mfa_enabled,
            sid: Some(sid),
            amr: amr.iter().map(|m| m.to_string()).collect(),
            aud: ACCESS_AUDIENCE.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
            jti: Uuid::new_v4(),
        }
    }

    /// Sign an access token
    pub fn sign_access(&self, claims: &AccessTokenClaims) -> Result<String, anyhow::Error> {
        let header = Header::new(Algorithm::RS256);
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Validate and decode an access token, judging expiry against `now`
    pub fn verify_access(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessTokenClaims, AuthError> {
        let validation = self.validation(ACCESS_AUDIENCE);
        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                AuthError::InvalidOrExpiredToken
            })?;
        if claims.exp <= now.timestamp() {
            tracing::debug!(jti = %claims.jti, "Access token expired");
            return Err(AuthError::InvalidOrExpiredToken);
        }
        Ok(claims)
    }

    /// Sign a temp token for the MFA step
    pub fn sign_temp(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        purpose: TempTokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let claims = TempTokenClaims {
            sub: user_id,
            tenant_id,
            email: email.to_string(),
            purpose,
            aud: MFA_AUDIENCE.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.temp_token_expiry_minutes)).timestamp(),
            jti: Uuid::new_v4(),
        };

        let header = Header::new(Algorithm::RS256);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode temp token: {}", e))
    }

    /// Validate and decode a temp token, judging expiry against `now`
    pub fn verify_temp(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TempTokenClaims, AuthError> {
        let validation = self.validation(MFA_AUDIENCE);
        let claims = decode::<TempTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Temp token rejected");
                AuthError::MfaVerificationFailed
            })?;
        if claims.exp <= now.timestamp() {
            tracing::debug!(jti = %claims.jti, "Temp token expired");
            return Err(AuthError::MfaVerificationFailed);
        }
        Ok(claims)
    }

    /// Generate an opaque refresh token and the hash that gets persisted
    pub fn generate_refresh(&self) -> RefreshTokenPair {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        let hash = hash_token(&raw);
        RefreshTokenPair { raw, hash }
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_expiry_days(&self) -> i64 {
        self.refresh_token_expiry_days
    }

    fn validation(&self, audience: &str) -> Validation {
        // Expiry is checked by the callers against the injected clock.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_audience(&[audience]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation
    }
}

/// SHA-256 hex digest used for refresh tokens and backup codes
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
