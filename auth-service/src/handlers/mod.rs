pub mod auth;
pub mod internal;
pub mod metrics;
pub mod user;

pub use auth::*;
pub use internal::validate_session;
pub use user::{get_me, get_user, reset_user_mfa, revoke_user_sessions};
