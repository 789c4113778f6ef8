use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use service_core::error::AppError;
use service_core::middleware::tracing::REQUEST_ID_HEADER;

use crate::error::GateError;
use crate::services::{metrics::record_decision, SecurityAlert, PRIVILEGED_ACCESS_DENIED};
use crate::utils::jwt::{decode_unverified, EdgeClaims};
use crate::utils::path::canonical_path;
use crate::GateState;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Who is asking decides the failure shape: redirects for page loads, status codes for APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestContext {
    Browser,
    Api,
}

impl RequestContext {
    pub fn of(path: &str, headers: &HeaderMap) -> Self {
        if path.starts_with("/api/") {
            return RequestContext::Api;
        }
        let wants_html = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false);
        if wants_html {
            RequestContext::Browser
        } else {
            RequestContext::Api
        }
    }
}

/// Bearer header first, then the `access_token` cookie.
pub fn request_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    bearer.or_else(|| {
        jar.get(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Coarse pre-check for privileged paths.
///
/// Decodes the access token without verifying it, applies the matching rule's
/// role/permission hints, then makes one delegated liveness call to
/// auth-service. Paths outside every rule pass through. Either way the
/// request continues with its canonical path, so the upstream sees exactly
/// what was classified.
pub async fn gate_middleware(
    State(state): State<GateState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let request = match canonical_path(request.uri().path()).and_then(|p| with_path(request, p)) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(reason = %e, "Rejected ambiguous request path");
            record_decision("malformed_path");
            return AppError::from(e).into_response();
        }
    };
    let path = request.uri().path().to_string();

    let Some(rule) = state.config.rule_for(&path) else {
        record_decision("passthrough");
        return next.run(request).await;
    };

    let context = RequestContext::of(&path, request.headers());

    let claims = match authenticate(request.headers(), &jar) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(path = %path, reason = %e, "Privileged request without usable token");
            record_decision("unauthenticated");
            return state.unauthenticated(context, e);
        }
    };

    if !rule.admits(&claims) {
        tracing::warn!(
            path = %path,
            user_id = %claims.sub,
            "Privileged path denied by coarse claims"
        );
        state.alerts.notify(SecurityAlert {
            code: PRIVILEGED_ACCESS_DENIED,
            path,
            user_id: Some(claims.sub.clone()),
            tenant_id: claims.tenant_id.clone(),
        });
        record_decision("forbidden");
        return state.forbidden(context);
    }

    let Some(sid) = claims.sid.as_deref() else {
        record_decision("unauthenticated");
        return state.unauthenticated(context, GateError::MissingSession);
    };

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Err(e) = state
        .auth_client
        .validate_session(sid, request_id.as_deref())
        .await
    {
        tracing::info!(
            path = %path,
            user_id = %claims.sub,
            reason = %e,
            "Delegated session check failed"
        );
        record_decision("session_rejected");
        return state.session_rejected(context, jar, e);
    }

    record_decision("allowed");
    next.run(request).await
}

fn with_path(request: Request, path: String) -> Result<Request, GateError> {
    if request.uri().path() == path {
        return Ok(request);
    }

    let (mut parts, body) = request.into_parts();
    let path_and_query = match parts.uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };
    parts.uri = path_and_query
        .parse::<Uri>()
        .map_err(|_| GateError::MalformedPath)?;
    Ok(Request::from_parts(parts, body))
}

fn authenticate(headers: &HeaderMap, jar: &CookieJar) -> Result<EdgeClaims, GateError> {
    let token = request_token(headers, jar).ok_or(GateError::MissingToken)?;
    decode_unverified(&token, Utc::now().timestamp())
}

impl GateState {
    fn unauthenticated(&self, context: RequestContext, err: GateError) -> Response {
        match context {
            RequestContext::Browser => {
                Redirect::to(&self.config.redirects.login_path).into_response()
            }
            RequestContext::Api => AppError::from(err).into_response(),
        }
    }

    fn forbidden(&self, context: RequestContext) -> Response {
        match context {
            RequestContext::Browser => {
                Redirect::to(&self.config.redirects.safe_path).into_response()
            }
            RequestContext::Api => AppError::from(GateError::Forbidden).into_response(),
        }
    }

    fn session_rejected(&self, context: RequestContext, jar: CookieJar, err: GateError) -> Response {
        let jar = jar
            .remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
            .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/"));
        match context {
            RequestContext::Browser => {
                (jar, Redirect::to(&self.config.redirects.login_path)).into_response()
            }
            RequestContext::Api => (jar, AppError::from(err)).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn api_prefix_wins_over_accept() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert_eq!(RequestContext::of("/api/users", &headers), RequestContext::Api);
        assert_eq!(RequestContext::of("/admin", &headers), RequestContext::Browser);
    }

    #[test]
    fn missing_accept_means_api() {
        let headers = HeaderMap::new();
        assert_eq!(RequestContext::of("/admin", &headers), RequestContext::Api);

        let mut json = HeaderMap::new();
        json.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert_eq!(RequestContext::of("/admin", &json), RequestContext::Api);
    }

    #[test]
    fn bearer_beats_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=cookie-token"));
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(request_token(&headers, &jar).as_deref(), Some("header-token"));

        headers.remove(header::AUTHORIZATION);
        assert_eq!(request_token(&headers, &jar).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer lower-token"));
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(request_token(&headers, &jar).as_deref(), Some("lower-token"));
    }

    #[test]
    fn canonical_path_replaces_the_uri_and_keeps_the_query() {
        let request = Request::builder()
            .uri("/public/../admin/panel?tab=users")
            .body(axum::body::Body::empty())
            .unwrap();
        let canonical = canonical_path(request.uri().path()).unwrap();
        let request = with_path(request, canonical).unwrap();
        assert_eq!(request.uri().path(), "/admin/panel");
        assert_eq!(request.uri().query(), Some("tab=users"));
    }

    #[test]
    fn non_bearer_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let jar = CookieJar::from_headers(&headers);
        assert!(request_token(&headers, &jar).is_none());
    }
}
