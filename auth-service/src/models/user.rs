//! User model - tenant-scoped user accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// User state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Active,
    Pending,
    Suspended,
    Deactivated,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Active => "active",
            UserState::Pending => "pending",
            UserState::Suspended => "suspended",
            UserState::Deactivated => "deactivated",
        }
    }
}

/// User entity (tenant-scoped).
///
/// A missing `password_hash` marks an invited account that has not set a
/// password yet; such users cannot log in.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub is_locked: bool,
    pub user_state_code: String,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub mfa_setup_required: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new active user with a password hash.
    pub fn new(tenant_id: Uuid, email: String, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            tenant_id,
            email,
            password_hash,
            display_name: None,
            is_active: true,
            is_locked: false,
            user_state_code: UserState::Active.as_str().to_string(),
            mfa_enabled: false,
            mfa_secret: None,
            mfa_setup_required: false,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_invite_pending(&self) -> bool {
        self.password_hash.is_none()
    }

    /// Reason the account may not authenticate, if any.
    pub fn unavailable_reason(&self) -> Option<&'static str> {
        if !self.is_active {
            Some("inactive")
        } else if self.is_locked {
            Some("locked")
        } else if self.user_state_code != UserState::Active.as_str() {
            Some("status_not_active")
        } else {
            None
        }
    }

    pub fn can_authenticate(&self) -> bool {
        self.unavailable_reason().is_none()
    }

    /// Whether a second factor gates session issuance.
    pub fn needs_second_factor(&self) -> bool {
        self.mfa_enabled || self.mfa_setup_required
    }

    /// Convert to sanitized response (no sensitive fields).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self)
    }
}

/// User response (without sensitive fields).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub mfa_enabled: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            user_id: u.user_id,
            tenant_id: u.tenant_id,
            email: u.email.clone(),
            display_name: u.display_name.clone(),
            mfa_enabled: u.mfa_enabled,
            created_utc: u.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_can_authenticate() {
        let user = User::new(Uuid::new_v4(), "a@x.com".into(), Some("hash".into()));
        assert!(user.can_authenticate());
        assert!(!user.is_invite_pending());
        assert!(!user.needs_second_factor());
    }

    #[test]
    fn unavailable_reason_checks_flags_in_order() {
        let mut user = User::new(Uuid::new_v4(), "a@x.com".into(), None);
        assert!(user.is_invite_pending());

        user.user_state_code = UserState::Suspended.as_str().to_string();
        assert_eq!(user.unavailable_reason(), Some("status_not_active"));

        user.is_locked = true;
        assert_eq!(user.unavailable_reason(), Some("locked"));

        user.is_active = false;
        assert_eq!(user.unavailable_reason(), Some("inactive"));
    }
}
