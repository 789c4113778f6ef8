use service_core::config::{get_env, parse_env};
use std::time::Duration;

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// auth-service base URL, also used for business calls built with [`ClientConfig::url`].
    pub base_url: String,
    /// Refresh when the access token expires within this window.
    pub refresh_buffer: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_buffer: Duration::from_secs(30),
            request_timeout: Duration::from_secs(15),
        }
    }

    pub fn from_env() -> Result<Self, ClientError> {
        let to_config = |e: service_core::error::AppError| ClientError::Config(e.to_string());

        let base_url = get_env("AUTH_BASE_URL", Some("http://localhost:8080"), false)
            .map_err(to_config)?;
        let buffer: u64 =
            parse_env("SESSION_REFRESH_BUFFER_SECONDS", Some("30"), false).map_err(to_config)?;
        let timeout: u64 =
            parse_env("SESSION_REQUEST_TIMEOUT_SECONDS", Some("15"), false).map_err(to_config)?;

        Ok(Self {
            base_url,
            refresh_buffer: Duration::from_secs(buffer),
            request_timeout: Duration::from_secs(timeout),
        })
    }

    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        format!("{}/{}", base, path.trim().trim_start_matches('/'))
    }
}
