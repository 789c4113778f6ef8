use service_core::error::AppError;
use thiserror::Error;

const MAX_ERROR_CHARS: usize = 200;

/// Errors surfaced to callers of [`crate::SessionManager`].
///
/// `Clone` because one refresh outcome is handed to every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The session is gone; the user has to sign in again.
    #[error("Login required")]
    LoginRequired,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Response error: {0}")]
    Parse(String),

    #[error("Token store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Network(err.to_string())
        }
    }

    /// Transport failures leave the session intact; the next call retries rotation.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout => true,
            ClientError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ClientError::Http {
            status,
            message: error_message(&body),
        }
    }
}

/// Prefer the server's `{error}` field; otherwise a trimmed, truncated body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Request failed.".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::LoginRequired => {
                AppError::Unauthorized(anyhow::anyhow!("Login required"))
            }
            ClientError::Network(msg) => AppError::BadGateway(msg),
            ClientError::Timeout => AppError::ServiceUnavailable,
            ClientError::Http { status: 401, message } => {
                AppError::Unauthorized(anyhow::anyhow!(message))
            }
            ClientError::Http { status: 403, message } => {
                AppError::Forbidden(anyhow::anyhow!(message))
            }
            ClientError::Http { status: 429, message } => AppError::TooManyRequests(message, None),
            ClientError::Http { message, .. } => AppError::BadGateway(message),
            ClientError::Parse(msg) | ClientError::Store(msg) => {
                AppError::InternalError(anyhow::anyhow!(msg))
            }
            ClientError::Config(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_field_is_preferred() {
        assert_eq!(error_message(r#"{"error":"Invalid credentials"}"#), "Invalid credentials");
        assert_eq!(error_message("   "), "Request failed.");
        assert_eq!(error_message(&"x".repeat(500)).len(), MAX_ERROR_CHARS);
    }

    #[test]
    fn transient_errors() {
        assert!(ClientError::Timeout.is_transient());
        assert!(ClientError::Http { status: 503, message: String::new() }.is_transient());
        assert!(!ClientError::Http { status: 401, message: String::new() }.is_transient());
        assert!(!ClientError::LoginRequired.is_transient());
    }
}
