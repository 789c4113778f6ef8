//! Refresh session model - one record per rotation step of a login lineage.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Client details captured when a lineage starts and copied to successors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}

/// Session entity.
///
/// `session_id` is the `sid` claim of access tokens minted for this session.
/// Only the SHA-256 hash of the refresh token is stored.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub mfa_verified: bool,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub last_active_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    /// Token hash of the successor once this session has been rotated.
    pub replaced_by_token: Option<String>,
}

impl Session {
    /// Start a new lineage.
    pub fn new(
        user_id: Uuid,
        token_hash: String,
        mfa_verified: bool,
        metadata: SessionMetadata,
        now: DateTime<Utc>,
        expiry_days: i64,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            token_hash,
            mfa_verified,
            device_info: metadata.device_info,
            ip_address: metadata.ip_address,
            created_utc: now,
            last_active_utc: now,
            expiry_utc: now + Duration::days(expiry_days),
            revoked_utc: None,
            replaced_by_token: None,
        }
    }

    /// Next link in the lineage, inheriting user, MFA state and client details.
    pub fn successor(&self, token_hash: String, now: DateTime<Utc>, expiry_days: i64) -> Self {
        Self::new(
            self.user_id,
            token_hash,
            self.mfa_verified,
            self.metadata(),
            now,
            expiry_days,
        )
    }

    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            device_info: self.device_info.clone(),
            ip_address: self.ip_address.clone(),
        }
    }

    /// Not revoked and not expired at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_utc.is_none() && self.expiry_utc > now
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }
}
