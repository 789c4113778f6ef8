pub mod audit_event;
pub mod backup_code;
pub mod permission;
pub mod role;
pub mod session;
pub mod user;

pub use audit_event::{AuditEvent, AuditEventType};
pub use backup_code::BackupCode;
pub use permission::{Permission, PermissionGrant};
pub use role::{Role, RolePermission, UserRole};
pub use session::{Session, SessionMetadata};
pub use user::{User, UserResponse, UserState};
