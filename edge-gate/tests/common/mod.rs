#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use edge_gate::{
    build_router,
    config::{
        parse_rules, AuthServiceSettings, GateConfig, RedirectSettings, UpstreamSettings,
    },
    GateState,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{
    matchers::{header as header_matcher, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const INTERNAL_SECRET: &str = "edge-gate-test-internal-secret-0123456789";
pub const VALIDATE_PATH: &str = "/internal/sessions/validate";

pub const DEFAULT_RULES: &str = r#"[
    {"prefix": "/admin", "roles": ["admin"]},
    {"prefix": "/api/admin", "permissions": ["USER_MANAGE"]},
    {"prefix": "/account"}
]"#;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }

    /// True when a removal cookie for `name` was sent.
    pub fn clears_cookie(&self, name: &str) -> bool {
        let prefix = format!("{}=", name);
        self.set_cookies()
            .iter()
            .any(|c| c.starts_with(&prefix) && (c.contains("Max-Age=0") || c.contains("Expires=")))
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

pub struct TestGate {
    pub router: Router,
    pub auth: MockServer,
    pub upstream: MockServer,
    pub webhook: MockServer,
}

impl TestGate {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(adjust: impl FnOnce(&mut GateConfig)) -> Self {
        let auth = MockServer::start().await;
        let upstream = MockServer::start().await;
        let webhook = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/alerts"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&webhook)
            .await;

        let mut config = create_test_config(&auth.uri(), &upstream.uri(), &webhook.uri());
        adjust(&mut config);

        let state = GateState::new(config).expect("gate state");
        Self {
            router: build_router(state),
            auth,
            upstream,
            webhook,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).to_string(),
        }
    }

    /// API-style GET with an optional bearer token.
    pub async fn api_get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::get(uri).header(header::ACCEPT, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Browser navigation carrying the token in the access cookie.
    pub async fn browser_get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::get(uri).header(
            header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        );
        if let Some(token) = token {
            builder = builder.header(
                header::COOKIE,
                format!("access_token={}; refresh_token=opaque", token),
            );
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn session_check_answers(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(VALIDATE_PATH))
            .and(header_matcher("x-internal-secret", INTERNAL_SECRET))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.auth)
            .await;
    }

    pub async fn upstream_serves(&self, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.upstream)
            .await;
    }

    pub async fn upstream_hits(&self) -> usize {
        self.upstream
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }

    pub async fn session_checks(&self) -> usize {
        self.auth
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }

    pub async fn alerts_sent(&self) -> usize {
        self.webhook
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }

    /// Alerts are fire-and-forget, so poll until one arrives.
    pub async fn wait_for_alert(&self) -> Option<Value> {
        for _ in 0..50 {
            if let Some(requests) = self.webhook.received_requests().await {
                if let Some(first) = requests.first() {
                    return first.body_json::<Value>().ok();
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        None
    }
}

pub fn create_test_config(auth_url: &str, upstream_url: &str, webhook_url: &str) -> GateConfig {
    GateConfig {
        common: service_core::config::Config { port: 8090 },
        is_prod: false,
        service_name: "edge-gate-test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        auth_service: AuthServiceSettings {
            url: auth_url.to_string(),
            internal_api_secret: INTERNAL_SECRET.to_string(),
            timeout_seconds: 2,
        },
        upstream: UpstreamSettings {
            url: upstream_url.to_string(),
            timeout_seconds: 5,
            max_body_bytes: 1024 * 1024,
        },
        redirects: RedirectSettings {
            login_path: "/login".to_string(),
            safe_path: "/".to_string(),
        },
        alert_webhook_url: Some(format!("{}/alerts", webhook_url)),
        privileged_rules: parse_rules(DEFAULT_RULES).expect("rules"),
    }
}

/// Unsigned access token; the gate never checks signatures.
pub fn access_token(roles: &[&str], permissions: &[&str], sid: Option<&str>, ttl_secs: i64) -> String {
    let mut claims = json!({
        "sub": "11111111-1111-1111-1111-111111111111",
        "tenantId": "22222222-2222-2222-2222-222222222222",
        "email": "a@x.com",
        "roles": roles,
        "permissions": permissions,
        "aud": "access",
        "iss": "auth-service",
        "exp": Utc::now().timestamp() + ttl_secs,
    });
    if let Some(sid) = sid {
        claims["sid"] = json!(sid);
    }
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

pub const SID: &str = "33333333-3333-3333-3333-333333333333";

pub fn admin_token() -> String {
    access_token(&["admin"], &["USER_MANAGE"], Some(SID), 600)
}
