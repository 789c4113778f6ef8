use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Authentication required")]
    MissingToken,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Token carries no session id")]
    MissingSession,

    #[error("Access denied")]
    Forbidden,

    #[error("Session rejected: {0}")]
    SessionRejected(String),

    #[error("Session validation unavailable: {0}")]
    ValidationUnavailable(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Request body too large")]
    BodyTooLarge,

    #[error("Malformed request path")]
    MalformedPath,
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::MissingToken
            | GateError::MalformedToken(_)
            | GateError::ExpiredToken
            | GateError::MissingSession
            | GateError::SessionRejected(_)
            | GateError::ValidationUnavailable(_) => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
            GateError::Forbidden => AppError::Forbidden(anyhow::anyhow!("Access denied")),
            GateError::Upstream(msg) => AppError::BadGateway(msg),
            GateError::BodyTooLarge => {
                AppError::BadRequest(anyhow::anyhow!("Request body too large"))
            }
            GateError::MalformedPath => {
                AppError::BadRequest(anyhow::anyhow!("Malformed request path"))
            }
        }
    }
}
