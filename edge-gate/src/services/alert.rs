use reqwest::Client;
use serde::Serialize;
use service_core::observability::TraceContextExt;

pub const PRIVILEGED_ACCESS_DENIED: &str = "EDGE_PRIVILEGED_ACCESS_DENIED";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    pub code: &'static str,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Fire-and-forget delivery of security alerts to an optional webhook.
#[derive(Clone)]
pub struct AlertNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl AlertNotifier {
    pub fn new(client: Client, webhook_url: Option<String>) -> Self {
        Self {
            client,
            webhook_url,
        }
    }

    /// Log the alert and post it in the background. Never blocks the caller.
    pub fn notify(&self, alert: SecurityAlert) {
        tracing::warn!(
            code = alert.code,
            path = %alert.path,
            user_id = alert.user_id.as_deref().unwrap_or("-"),
            tenant_id = alert.tenant_id.as_deref().unwrap_or("-"),
            "Security alert"
        );

        let Some(url) = self.webhook_url.as_deref() else {
            return;
        };

        let request = self
            .client
            .post(url)
            .with_trace_context(None)
            .json(&alert);

        tokio::spawn(async move {
            match request.send().await {
                Ok(res) if !res.status().is_success() => {
                    tracing::warn!(status = %res.status(), "Alert webhook rejected alert");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Alert webhook unreachable");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_serializes_camel_case_without_empty_ids() {
        let alert = SecurityAlert {
            code: PRIVILEGED_ACCESS_DENIED,
            path: "/admin".to_string(),
            user_id: Some("u-1".to_string()),
            tenant_id: None,
        };
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["code"], "EDGE_PRIVILEGED_ACCESS_DENIED");
        assert_eq!(value["userId"], "u-1");
        assert!(value.get("tenantId").is_none());
    }
}
