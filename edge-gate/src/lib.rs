pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod utils;

use axum::{
    http::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use config::GateConfig;
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use services::{AlertNotifier, AuthClient};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Shared state for the gate and the upstream proxy.
#[derive(Clone)]
pub struct GateState {
    pub config: Arc<GateConfig>,
    pub auth_client: Arc<AuthClient>,
    pub alerts: AlertNotifier,
    pub upstream: reqwest::Client,
}

impl GateState {
    pub fn new(config: GateConfig) -> Result<Self, AppError> {
        let auth_client = AuthClient::new(config.auth_service.clone())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Auth client: {}", e)))?;

        // Redirects from the upstream belong to the browser, not to us.
        let upstream = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.upstream.timeout_seconds))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Upstream client: {}", e)))?;

        let alerts = AlertNotifier::new(upstream.clone(), config.alert_webhook_url.clone());

        Ok(Self {
            config: Arc::new(config),
            auth_client: Arc::new(auth_client),
            alerts,
            upstream,
        })
    }
}

pub fn build_router(state: GateState) -> Router {
    // Everything not owned by the gate is proxied, behind the gate.
    let gated = Router::new()
        .fallback(handlers::proxy::proxy)
        .layer(from_fn_with_state(state.clone(), middleware::gate_middleware))
        .with_state(state);

    Router::new()
        .route("/health", get(handlers::app::health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .fallback_service(gated)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
}
