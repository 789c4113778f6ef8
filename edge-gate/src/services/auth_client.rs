use crate::config::AuthServiceSettings;
use crate::error::GateError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use service_core::observability::TraceContextExt;
use std::time::Duration;

pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";
const VALIDATE_PATH: &str = "/internal/sessions/validate";

#[derive(Serialize)]
struct ValidateRequest<'a> {
    sid: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Client for auth-service's internal session check.
pub struct AuthClient {
    client: Client,
    settings: AuthServiceSettings,
}

impl AuthClient {
    pub fn new(settings: AuthServiceSettings) -> Result<Self, GateError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| GateError::ValidationUnavailable(e.to_string()))?;
        Ok(Self { client, settings })
    }

    pub fn base_url(&self) -> &str {
        &self.settings.url
    }

    /// Ask auth-service whether session `sid` is still live.
    ///
    /// Transport errors, non-2xx answers and `valid: false` are all failures.
    pub async fn validate_session(
        &self,
        sid: &str,
        request_id: Option<&str>,
    ) -> Result<(), GateError> {
        let url = format!("{}{}", self.settings.url.trim_end_matches('/'), VALIDATE_PATH);

        let response = self
            .client
            .post(&url)
            .with_trace_context(request_id)
            .header(INTERNAL_SECRET_HEADER, &self.settings.internal_api_secret)
            .json(&ValidateRequest { sid })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "Session validation request failed");
                GateError::ValidationUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Session validation returned non-success status");
            return Err(GateError::ValidationUnavailable(format!("status {}", status)));
        }

        let body: ValidateResponse = response
            .json()
            .await
            .map_err(|e| GateError::ValidationUnavailable(e.to_string()))?;

        if body.valid {
            Ok(())
        } else {
            Err(GateError::SessionRejected(
                body.reason.unwrap_or_else(|| "invalid".to_string()),
            ))
        }
    }
}
