pub mod audit;
pub mod auth;
pub mod clock;
pub mod database;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod memory;
pub mod metrics;
pub mod mfa;
pub mod permissions;
pub mod rotation;
pub mod store;
pub mod throttle;

pub use audit::AuditLogger;
pub use auth::{AuthService, LoginOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::PgCredentialStore;
pub use error::{AuthError, StoreError};
pub use guard::{AuthGuard, AuthenticatedUser, PermissionRef, SessionStatus};
pub use jwt::{AccessTokenClaims, JwtService, TempTokenClaims, TempTokenPurpose};
pub use memory::MemoryCredentialStore;
pub use mfa::{MfaChallenge, MfaChallengeEngine, MfaSetupResponse};
pub use permissions::{PermissionResolver, PermissionSet, RoleSet};
pub use rotation::{RefreshRotationEngine, TokenResponse};
pub use store::{CredentialStore, SessionReplacement};
pub use throttle::{AttemptCounter, InMemoryAttemptCounter, LoginThrottle, RedisAttemptCounter};
