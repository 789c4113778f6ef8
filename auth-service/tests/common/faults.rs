//! Credential store wrapper that fails chosen writes on demand.

use async_trait::async_trait;
use auth_service::{
    models::{AuditEvent, PermissionGrant, Role, Session, User},
    services::{CredentialStore, MemoryCredentialStore, SessionReplacement, StoreError},
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub struct FaultyStore {
    inner: Arc<MemoryCredentialStore>,
    fail_session_replacement: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryCredentialStore>) -> Self {
        Self {
            inner,
            fail_session_replacement: AtomicBool::new(false),
        }
    }

    /// Make `replace_user_sessions` error out without touching the store.
    pub fn fail_session_replacement(&self, fail: bool) {
        self.fail_session_replacement.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialStore for FaultyStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }

    async fn find_users_by_email(
        &self,
        email: &str,
        tenant_id: Option<Uuid>,
    ) -> Result<Vec<User>, StoreError> {
        self.inner.find_users_by_email(email, tenant_id).await
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_id(user_id).await
    }

    async fn find_roles_for_user(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<Role>, StoreError> {
        self.inner.find_roles_for_user(user_id, tenant_id).await
    }

    async fn find_permission_grants(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<PermissionGrant>, StoreError> {
        self.inner.find_permission_grants(user_id, tenant_id).await
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.insert_session(session).await
    }

    async fn find_session_by_id(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        self.inner.find_session_by_id(session_id).await
    }

    async fn find_live_session_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        self.inner.find_live_session_by_hash(token_hash, now).await
    }

    async fn rotate_session(
        &self,
        parent_id: Uuid,
        successor: &Session,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.rotate_session(parent_id, successor, now).await
    }

    async fn touch_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.touch_session(session_id, now).await
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.revoke_session(session_id, now).await
    }

    async fn revoke_user_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.inner.revoke_user_sessions(user_id, now).await
    }

    async fn replace_user_sessions(
        &self,
        user_id: Uuid,
        replacement: SessionReplacement<'_>,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError> {
        if self.fail_session_replacement.load(Ordering::SeqCst) {
            return Err(StoreError::Other("injected session write failure".into()));
        }
        self.inner.replace_user_sessions(user_id, replacement, now).await
    }

    async fn store_mfa_enrollment(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .store_mfa_enrollment(user_id, secret, backup_code_hashes, now)
            .await
    }

    async fn reset_mfa(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.reset_mfa(user_id, now).await
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.inner.insert_audit_event(event).await
    }
}
