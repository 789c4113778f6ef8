//! Permission catalog.

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Codes seeded by the initial migration.
pub const USER_VIEW: &str = "USER_VIEW";
pub const USER_MANAGE: &str = "USER_MANAGE";

/// Global permission entry with a stable numeric id and a stable code.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Permission {
    pub permission_id: i32,
    pub permission_code: String,
    pub description: Option<String>,
}

impl Permission {
    pub fn new(permission_id: i32, permission_code: &str) -> Self {
        Self {
            permission_id,
            permission_code: permission_code.to_string(),
            description: None,
        }
    }
}

/// One permission reached through one of the user's roles.
#[derive(Debug, Clone, FromRow)]
pub struct PermissionGrant {
    pub role_id: Uuid,
    pub role_tenant_id: Uuid,
    pub permission_id: i32,
    pub permission_code: String,
}
