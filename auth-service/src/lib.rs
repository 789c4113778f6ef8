pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AuthConfig, Environment, SwaggerMode};
use crate::middleware::{
    auth_middleware, internal_secret_middleware, metrics_middleware, INTERNAL_SECRET_HEADER,
};
use crate::services::{
    AttemptCounter, AuditLogger, AuthGuard, AuthService, Clock, CredentialStore, JwtService,
    LoginThrottle, MfaChallengeEngine, PermissionResolver, RefreshRotationEngine,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::logout,
        handlers::auth::mfa::mfa_setup,
        handlers::auth::mfa::mfa_verify,
        handlers::user::get_me,
        handlers::user::get_user,
        handlers::user::revoke_user_sessions,
        handlers::user::reset_user_mfa,
        handlers::internal::validate_session,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::LoginRequest,
            dtos::auth::MfaSetupRequest,
            dtos::auth::MfaVerifyRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::SessionValidateRequest,
            dtos::auth::SessionValidateResponse,
            dtos::auth::RevokeSessionsResponse,
            services::TokenResponse,
            services::MfaChallenge,
            services::MfaSetupResponse,
            services::AuthenticatedUser,
            models::UserResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Password login and session rotation"),
        (name = "MFA", description = "Second-factor enrollment and verification"),
        (name = "User", description = "Principal and tenant-scoped user administration"),
        (name = "Internal", description = "Service-to-service session checks"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "internal_secret",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(INTERNAL_SECRET_HEADER))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn CredentialStore>,
    pub jwt: JwtService,
    pub guard: AuthGuard,
    pub auth_service: AuthService,
    pub rotation: RefreshRotationEngine,
    pub mfa: MfaChallengeEngine,
    pub login_rate_limiter: IpRateLimiter,
    pub mfa_rate_limiter: IpRateLimiter,
    pub refresh_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire every service over one store, attempt counter and clock.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        attempts: Arc<dyn AttemptCounter>,
        clock: Arc<dyn Clock>,
        jwt: JwtService,
    ) -> Self {
        let audit = AuditLogger::new(store.clone());
        let resolver = PermissionResolver::new(store.clone());
        let throttle = LoginThrottle::new(attempts, &config.throttle);

        let rotation = RefreshRotationEngine::new(
            store.clone(),
            jwt.clone(),
            resolver,
            clock.clone(),
            audit.clone(),
        );
        let mfa = MfaChallengeEngine::new(
            store.clone(),
            jwt.clone(),
            rotation.clone(),
            throttle.clone(),
            clock.clone(),
            audit.clone(),
            config.mfa.clone(),
        );
        let guard = AuthGuard::new(
            jwt.clone(),
            store.clone(),
            clock,
            audit.clone(),
            config.session.revocation_grace_seconds,
        );
        let auth_service = AuthService::new(
            store.clone(),
            rotation.clone(),
            mfa.clone(),
            throttle,
            audit,
        );

        let limits = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let mfa_rate_limiter =
            create_ip_rate_limiter(limits.mfa_attempts, limits.mfa_window_seconds);
        let refresh_rate_limiter =
            create_ip_rate_limiter(limits.refresh_attempts, limits.refresh_window_seconds);
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Self {
            config,
            store,
            jwt,
            guard,
            auth_service,
            rotation,
            mfa,
            login_rate_limiter,
            mfa_rate_limiter,
            refresh_rate_limiter,
            ip_rate_limiter,
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let login_route = Router::new()
        .route("/login", post(handlers::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let mfa_routes = Router::new()
        .route("/mfa/setup", post(handlers::mfa_setup))
        .route("/mfa/verify", post(handlers::mfa_verify))
        .layer(from_fn_with_state(
            state.mfa_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let refresh_route = Router::new()
        .route("/refresh", post(handlers::refresh))
        .layer(from_fn_with_state(
            state.refresh_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected_routes = Router::new()
        .route("/me", get(handlers::get_me))
        .route("/users/:id", get(handlers::get_user))
        .route(
            "/users/:id/sessions/revoke",
            post(handlers::revoke_user_sessions),
        )
        .route("/users/:id/mfa/reset", post(handlers::reset_user_mfa))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let internal_routes = Router::new()
        .route(
            "/internal/sessions/validate",
            post(handlers::validate_session),
        )
        .layer(from_fn_with_state(
            state.clone(),
            internal_secret_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled = match state.config.environment {
        Environment::Dev => true,
        Environment::Prod => state.config.swagger.enabled == SwaggerMode::Public,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    }

    if state.config.security.allowed_origins.iter().any(|o| o == "*") {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "Wildcard CORS origin cannot be combined with credentialed cookies"
        )));
    }

    let allowed_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid CORS origin '{}': {}", o, e))
            })
        })
        .collect::<Result<Vec<HeaderValue>, AppError>>()?;

    let app = app
        .merge(login_route)
        .merge(mfa_routes)
        .merge(refresh_route)
        .route("/logout", post(handlers::logout))
        .merge(protected_routes)
        .merge(internal_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Credential store unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Credential store health check failed");
        AppError::DatabaseError(anyhow::Error::new(e))
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "credential_store": "up"
        }
    })))
}
