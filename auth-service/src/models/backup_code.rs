//! Single-use MFA recovery codes.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct BackupCode {
    pub code_id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hex of the normalized code.
    pub code_hash: String,
    pub used_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl BackupCode {
    pub fn new(user_id: Uuid, code_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            code_id: Uuid::new_v4(),
            user_id,
            code_hash,
            used_utc: None,
            created_utc: now,
        }
    }
}
