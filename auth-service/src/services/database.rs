//! PostgreSQL credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{AuditEvent, PermissionGrant, Role, Session, User};
use crate::services::{AuthError, CredentialStore, SessionReplacement, StoreError};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Delete a role and, through the cascades, its grants and assignments.
    /// System roles are immutable.
    pub async fn delete_role(&self, role_id: Uuid) -> Result<(), AuthError> {
        let deleted = sqlx::query("DELETE FROM roles WHERE role_id = $1 AND is_system = FALSE")
            .bind(role_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        if deleted.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<bool> =
            sqlx::query_scalar("SELECT is_system FROM roles WHERE role_id = $1")
                .bind(role_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)?;
        match exists {
            Some(_) => Err(AuthError::Conflict("System roles cannot be deleted".into())),
            None => Err(AuthError::NotFound("Role")),
        }
    }
}

const INSERT_SESSION: &str = r#"
    INSERT INTO sessions (
        session_id, user_id, token_hash, mfa_verified, device_info, ip_address,
        created_utc, last_active_utc, expiry_utc, revoked_utc, replaced_by_token
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
"#;

fn bind_session<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    session: &'q Session,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.mfa_verified)
        .bind(&session.device_info)
        .bind(&session.ip_address)
        .bind(session.created_utc)
        .bind(session.last_active_utc)
        .bind(session.expiry_utc)
        .bind(session.revoked_utc)
        .bind(&session.replaced_by_token)
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                StoreError::from(e)
            })?;
        Ok(())
    }

    // ==================== User Operations ====================

    async fn find_users_by_email(
        &self,
        email: &str,
        tenant_id: Option<Uuid>,
    ) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE lower(email) = lower($1)
              AND ($2::uuid IS NULL OR tenant_id = $2)
            "#,
        )
        .bind(email)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    // ==================== RBAC Operations ====================

    async fn find_roles_for_user(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<Role>, StoreError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN user_roles ur ON ur.role_id = r.role_id
            WHERE ur.user_id = $1 AND r.tenant_id = $2
            ORDER BY r.role_name
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn find_permission_grants(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<PermissionGrant>, StoreError> {
        let grants = sqlx::query_as::<_, PermissionGrant>(
            r#"
            SELECT r.role_id, r.tenant_id AS role_tenant_id,
                   p.permission_id, p.permission_code
            FROM user_roles ur
            JOIN roles r ON r.role_id = ur.role_id
            JOIN role_permissions rp ON rp.role_id = r.role_id
            JOIN permissions p ON p.permission_id = rp.permission_id
            WHERE ur.user_id = $1 AND r.tenant_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    // ==================== Session Operations ====================

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        bind_session(sqlx::query(INSERT_SESSION), session)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_session_by_id(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn find_live_session_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE token_hash = $1 AND revoked_utc IS NULL AND expiry_utc > $2
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn rotate_session(
        &self,
        parent_id: Uuid,
        successor: &Session,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_utc = $2, last_active_utc = $2, replaced_by_token = $3
            WHERE session_id = $1 AND revoked_utc IS NULL AND expiry_utc > $2
            "#,
        )
        .bind(parent_id)
        .bind(now)
        .bind(&successor.token_hash)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        bind_session(sqlx::query(INSERT_SESSION), successor)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn touch_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE sessions SET last_active_utc = $2
            WHERE session_id = $1 AND revoked_utc IS NULL AND last_active_utc < $2
            "#,
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_utc = $2 WHERE session_id = $1 AND revoked_utc IS NULL",
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_user_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_utc = $2 WHERE user_id = $1 AND revoked_utc IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn replace_user_sessions(
        &self,
        user_id: Uuid,
        replacement: SessionReplacement<'_>,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(code_hash) = replacement.backup_code_hash {
            let used = sqlx::query(
                r#"
                UPDATE backup_codes SET used_utc = $3
                WHERE user_id = $1 AND code_hash = $2 AND used_utc IS NULL
                "#,
            )
            .bind(user_id)
            .bind(code_hash)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if used != 1 {
                tx.rollback().await?;
                return Ok(None);
            }
        }

        let revoked = sqlx::query(
            "UPDATE sessions SET revoked_utc = $2 WHERE user_id = $1 AND revoked_utc IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        bind_session(sqlx::query(INSERT_SESSION), replacement.session)
            .execute(&mut *tx)
            .await?;

        if replacement.complete_enrollment {
            sqlx::query(
                r#"
                UPDATE users
                SET mfa_enabled = TRUE, mfa_setup_required = FALSE, updated_utc = $2
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(revoked))
    }

    // ==================== MFA Operations ====================

    async fn store_mfa_enrollment(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET mfa_secret = $2, updated_utc = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(secret)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for code_hash in backup_code_hashes {
            sqlx::query(
                r#"
                INSERT INTO backup_codes (code_id, user_id, code_hash, used_utc, created_utc)
                VALUES ($1, $2, $3, NULL, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(code_hash)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn reset_mfa(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE users
            SET mfa_enabled = FALSE, mfa_secret = NULL, mfa_setup_required = TRUE, updated_utc = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let revoked = sqlx::query(
            "UPDATE sessions SET revoked_utc = $2 WHERE user_id = $1 AND revoked_utc IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(revoked)
    }

    // ==================== Audit Operations ====================

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (
                event_id, tenant_id, user_id, event_type_code, event_data, ip_address, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.event_id)
        .bind(event.tenant_id)
        .bind(event.user_id)
        .bind(&event.event_type_code)
        .bind(&event.event_data)
        .bind(&event.ip_address)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
