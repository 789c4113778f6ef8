//! Role model - tenant-scoped permission bundles.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Role entity (tenant-scoped).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Role {
    pub role_id: Uuid,
    pub tenant_id: Uuid,
    pub role_name: String,
    pub description: Option<String>,
    /// System roles cannot be modified or deleted.
    pub is_system: bool,
    pub created_utc: DateTime<Utc>,
}

impl Role {
    pub fn new(tenant_id: Uuid, role_name: String, is_system: bool) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            tenant_id,
            role_name,
            description: None,
            is_system,
            created_utc: Utc::now(),
        }
    }
}

/// Role to permission edge.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: i32,
}

/// User to role edge.
#[derive(Debug, Clone, FromRow)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub assigned_by: Option<Uuid>,
    pub assigned_utc: DateTime<Utc>,
}

impl UserRole {
    pub fn new(user_id: Uuid, role_id: Uuid, assigned_by: Option<Uuid>) -> Self {
        Self {
            user_id,
            role_id,
            assigned_by,
            assigned_utc: Utc::now(),
        }
    }
}
