//! Audit event model - security and compliance logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Audit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    LoginSucceeded,
    LoginFailed,
    LoginThrottled,
    MfaChallengeIssued,
    MfaEnrollmentStarted,
    MfaVerified,
    MfaFailed,
    MfaReset,
    BackupCodeUsed,
    TokenRefreshed,
    RefreshRejected,
    SessionRevoked,
    AllSessionsRevoked,
    TenantContextMissing,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::LoginSucceeded => "login_succeeded",
            AuditEventType::LoginFailed => "login_failed",
            AuditEventType::LoginThrottled => "login_throttled",
            AuditEventType::MfaChallengeIssued => "mfa_challenge_issued",
            AuditEventType::MfaEnrollmentStarted => "mfa_enrollment_started",
            AuditEventType::MfaVerified => "mfa_verified",
            AuditEventType::MfaFailed => "mfa_failed",
            AuditEventType::MfaReset => "mfa_reset",
            AuditEventType::BackupCodeUsed => "backup_code_used",
            AuditEventType::TokenRefreshed => "token_refreshed",
            AuditEventType::RefreshRejected => "refresh_rejected",
            AuditEventType::SessionRevoked => "session_revoked",
            AuditEventType::AllSessionsRevoked => "all_sessions_revoked",
            AuditEventType::TenantContextMissing => "tenant_context_missing",
        }
    }
}

/// Audit event entity.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub event_type_code: String,
    pub event_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            tenant_id: None,
            user_id: None,
            event_type_code: event_type.as_str().to_string(),
            event_data: None,
            ip_address: None,
            created_utc: Utc::now(),
        }
    }

    pub fn with_user(mut self, tenant_id: Uuid, user_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self.user_id = Some(user_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: Option<Uuid>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.event_data = Some(data);
        self
    }

    pub fn with_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }
}
