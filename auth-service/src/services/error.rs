use service_core::error::AppError;
use thiserror::Error;

/// Failure inside a credential store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account unavailable")]
    AccountUnavailable,

    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Session revoked")]
    SessionRevoked,

    #[error("Tenant context missing")]
    TenantContextMissing,

    #[error("Missing permission: {0}")]
    Forbidden(String),

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("MFA verification failed")]
    MfaVerificationFailed,

    #[error("Too many attempts")]
    TooManyAttempts { retry_after: Option<u64> },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            // Every authentication failure renders the same way so callers
            // cannot tell which check failed.
            AuthError::InvalidCredentials | AuthError::AccountUnavailable => {
                AppError::AuthError(anyhow::anyhow!("Invalid email or password"))
            }
            AuthError::MissingCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
            AuthError::InvalidOrExpiredToken
            | AuthError::SessionRevoked
            | AuthError::TenantContextMissing => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            AuthError::InvalidRefreshToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid refresh token"))
            }
            AuthError::MfaVerificationFailed => {
                AppError::AuthError(anyhow::anyhow!("Invalid verification code"))
            }
            AuthError::Forbidden(required) => {
                AppError::Forbidden(anyhow::anyhow!("Missing permission: {}", required))
            }
            AuthError::TooManyAttempts { retry_after } => AppError::TooManyRequests(
                "Too many failed attempts. Please try again later.".to_string(),
                retry_after,
            ),
            AuthError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            AuthError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            AuthError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}
