//! In-process credential store.
//!
//! All state sits behind one mutex, so each trait method is a single
//! critical section and gets the same all-or-nothing behavior as a
//! database transaction. Used by tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    AuditEvent, BackupCode, Permission, PermissionGrant, Role, RolePermission, Session, User,
    UserRole,
};
use crate::services::{AuthError, CredentialStore, SessionReplacement, StoreError};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<i32, Permission>,
    role_permissions: Vec<RolePermission>,
    user_roles: Vec<UserRole>,
    sessions: HashMap<Uuid, Session>,
    backup_codes: Vec<BackupCode>,
    audit_events: Vec<AuditEvent>,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<State>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Other("credential store lock poisoned".to_string()))
    }

    // ==================== Seeding & Administration ====================

    pub fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.lock()?.users.insert(user.user_id, user);
        Ok(())
    }

    /// Apply `f` to a stored user.
    pub fn update_user(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut User),
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Other(format!("unknown user {}", user_id)))?;
        f(user);
        user.updated_utc = Utc::now();
        Ok(())
    }

    pub fn insert_role(&self, role: Role) -> Result<(), StoreError> {
        self.lock()?.roles.insert(role.role_id, role);
        Ok(())
    }

    /// Delete a role and its edges. System roles are immutable.
    pub fn delete_role(&self, role_id: Uuid) -> Result<(), AuthError> {
        let mut state = self.lock()?;
        match state.roles.get(&role_id) {
            None => return Err(AuthError::NotFound("Role")),
            Some(role) if role.is_system => {
                return Err(AuthError::Conflict("System roles cannot be deleted".into()))
            }
            Some(_) => {}
        }
        state.roles.remove(&role_id);
        state.role_permissions.retain(|rp| rp.role_id != role_id);
        state.user_roles.retain(|ur| ur.role_id != role_id);
        Ok(())
    }

    pub fn insert_permission(&self, permission: Permission) -> Result<(), StoreError> {
        self.lock()?
            .permissions
            .insert(permission.permission_id, permission);
        Ok(())
    }

    pub fn grant_permission(&self, role_id: Uuid, permission_id: i32) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let edge = RolePermission {
            role_id,
            permission_id,
        };
        if !state.role_permissions.contains(&edge) {
            state.role_permissions.push(edge);
        }
        Ok(())
    }

    pub fn revoke_permission(&self, role_id: Uuid, permission_id: i32) -> Result<(), StoreError> {
        self.lock()?
            .role_permissions
            .retain(|rp| !(rp.role_id == role_id && rp.permission_id == permission_id));
        Ok(())
    }

    pub fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state
            .user_roles
            .iter()
            .any(|ur| ur.user_id == user_id && ur.role_id == role_id)
        {
            state
                .user_roles
                .push(UserRole::new(user_id, role_id, assigned_by));
        }
        Ok(())
    }

    pub fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    pub fn backup_codes_for_user(&self, user_id: Uuid) -> Result<Vec<BackupCode>, StoreError> {
        Ok(self
            .lock()?
            .backup_codes
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    pub fn audit_events(&self) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self.lock()?.audit_events.clone())
    }
}

fn revoke_live_sessions(state: &mut State, user_id: Uuid, now: DateTime<Utc>) -> u64 {
    let mut revoked = 0;
    for session in state.sessions.values_mut() {
        if session.user_id == user_id && session.revoked_utc.is_none() {
            session.revoked_utc = Some(now);
            revoked += 1;
        }
    }
    revoked
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn find_users_by_email(
        &self,
        email: &str,
        tenant_id: Option<Uuid>,
    ) -> Result<Vec<User>, StoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .filter(|u| u.email.eq_ignore_ascii_case(email))
            .filter(|u| tenant_id.map_or(true, |t| u.tenant_id == t))
            .cloned()
            .collect())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn find_roles_for_user(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<Role>, StoreError> {
        let state = self.lock()?;
        let mut roles: Vec<Role> = state
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id)
            .filter_map(|ur| state.roles.get(&ur.role_id))
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.role_name.cmp(&b.role_name));
        Ok(roles)
    }

    async fn find_permission_grants(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<PermissionGrant>, StoreError> {
        let state = self.lock()?;
        let mut grants = Vec::new();
        for ur in state.user_roles.iter().filter(|ur| ur.user_id == user_id) {
            let Some(role) = state.roles.get(&ur.role_id) else {
                continue;
            };
            if role.tenant_id != tenant_id {
                continue;
            }
            for rp in state.role_permissions.iter().filter(|rp| rp.role_id == role.role_id) {
                if let Some(permission) = state.permissions.get(&rp.permission_id) {
                    grants.push(PermissionGrant {
                        role_id: role.role_id,
                        role_tenant_id: role.tenant_id,
                        permission_id: permission.permission_id,
                        permission_code: permission.permission_code.clone(),
                    });
                }
            }
        }
        Ok(grants)
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.lock()?
            .sessions
            .insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session_by_id(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.lock()?.sessions.get(&session_id).cloned())
    }

    async fn find_live_session_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .find(|s| s.token_hash == token_hash && s.is_live(now))
            .cloned())
    }

    async fn rotate_session(
        &self,
        parent_id: Uuid,
        successor: &Session,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.sessions.get_mut(&parent_id) {
            Some(parent) if parent.is_live(now) => {
                parent.revoked_utc = Some(now);
                parent.last_active_utc = now;
                parent.replaced_by_token = Some(successor.token_hash.clone());
            }
            _ => return Ok(false),
        }
        state
            .sessions
            .insert(successor.session_id, successor.clone());
        Ok(true)
    }

    async fn touch_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(session) = self.lock()?.sessions.get_mut(&session_id) {
            if session.revoked_utc.is_none() && session.last_active_utc < now {
                session.last_active_utc = now;
            }
        }
        Ok(())
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.revoked_utc.is_none() => {
                session.revoked_utc = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        Ok(revoke_live_sessions(&mut state, user_id, now))
    }

    async fn replace_user_sessions(
        &self,
        user_id: Uuid,
        replacement: SessionReplacement<'_>,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError> {
        let mut state = self.lock()?;
        if replacement.complete_enrollment && !state.users.contains_key(&user_id) {
            return Err(StoreError::Other(format!("unknown user {}", user_id)));
        }

        if let Some(code_hash) = replacement.backup_code_hash {
            let code = state.backup_codes.iter_mut().find(|c| {
                c.user_id == user_id && c.code_hash == code_hash && c.used_utc.is_none()
            });
            match code {
                Some(code) => code.used_utc = Some(now),
                None => return Ok(None),
            }
        }

        let revoked = revoke_live_sessions(&mut state, user_id, now);
        let session = replacement.session;
        state.sessions.insert(session.session_id, session.clone());

        if replacement.complete_enrollment {
            if let Some(user) = state.users.get_mut(&user_id) {
                user.mfa_enabled = true;
                user.mfa_setup_required = false;
                user.updated_utc = now;
            }
        }
        Ok(Some(revoked))
    }

    async fn store_mfa_enrollment(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Other(format!("unknown user {}", user_id)))?;
        user.mfa_secret = Some(secret.to_string());
        user.updated_utc = now;

        state.backup_codes.retain(|c| c.user_id != user_id);
        state.backup_codes.extend(
            backup_code_hashes
                .iter()
                .map(|hash| BackupCode::new(user_id, hash.clone(), now)),
        );
        Ok(())
    }

    async fn reset_mfa(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.mfa_enabled = false;
            user.mfa_secret = None;
            user.mfa_setup_required = true;
            user.updated_utc = now;
        }
        state.backup_codes.retain(|c| c.user_id != user_id);
        Ok(revoke_live_sessions(&mut state, user_id, now))
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.lock()?.audit_events.push(event.clone());
        Ok(())
    }
}
