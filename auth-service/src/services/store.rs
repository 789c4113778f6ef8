//! Credential store seam.
//!
//! Every mutation that has to be atomic with respect to concurrent requests
//! is a single trait method, so implementations can wrap it in one
//! transaction (PostgreSQL) or one critical section (in-process).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{AuditEvent, PermissionGrant, Role, Session, User};
use crate::services::StoreError;

/// The session issued by a successful second factor and what it settles.
#[derive(Debug, Clone, Copy)]
pub struct SessionReplacement<'a> {
    pub session: &'a Session,
    /// Flip the user's MFA flags to enabled.
    pub complete_enrollment: bool,
    /// Backup code spent on this verification, burned with the replacement.
    pub backup_code_hash: Option<&'a str>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Users whose email matches case-insensitively, optionally within one tenant.
    async fn find_users_by_email(
        &self,
        email: &str,
        tenant_id: Option<Uuid>,
    ) -> Result<Vec<User>, StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Roles assigned to the user whose tenant is `tenant_id`.
    async fn find_roles_for_user(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<Role>, StoreError>;

    /// Permissions reachable through the user's roles in `tenant_id`.
    async fn find_permission_grants(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<PermissionGrant>, StoreError>;

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_session_by_id(&self, session_id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Session with this token hash that is neither revoked nor expired.
    async fn find_live_session_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    /// Revoke `parent_id` if still unrevoked, stamp its last activity, link it
    /// to the successor and insert the successor. Returns `false` and writes
    /// nothing when the parent was already revoked.
    async fn rotate_session(
        &self,
        parent_id: Uuid,
        successor: &Session,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Record activity on a live session.
    async fn touch_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Returns `false` when the session was unknown or already revoked.
    async fn revoke_session(&self, session_id: Uuid, now: DateTime<Utc>)
        -> Result<bool, StoreError>;

    /// Revoke every live session of the user, returning how many were revoked.
    async fn revoke_user_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Revoke every live session of the user and insert `replacement.session`
    /// in its place, as one unit of work.
    ///
    /// Returns `None` and writes nothing when `replacement.backup_code_hash`
    /// names no unused code of the user.
    async fn replace_user_sessions(
        &self,
        user_id: Uuid,
        replacement: SessionReplacement<'_>,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError>;

    /// Store a new TOTP secret and replace all backup codes.
    async fn store_mfa_enrollment(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Clear MFA material, require re-enrollment and revoke all sessions.
    async fn reset_mfa(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), StoreError>;
}
