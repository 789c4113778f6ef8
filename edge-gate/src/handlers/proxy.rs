use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName},
    response::Response,
};
use service_core::error::AppError;
use service_core::middleware::tracing::REQUEST_ID_HEADER;
use service_core::observability::TraceContextExt;

use crate::error::GateError;
use crate::services::metrics::record_upstream_status;
use crate::GateState;

// Connection-scoped headers never cross the proxy.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name) || name.as_str() == "keep-alive"
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name) && *name != header::HOST)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Forward whatever the gate let through to the upstream app.
pub async fn proxy(State(state): State<GateState>, request: Request) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!(
        "{}{}",
        state.config.upstream.url.trim_end_matches('/'),
        path_and_query
    );

    let body = to_bytes(body, state.config.upstream.max_body_bytes)
        .await
        .map_err(|_| GateError::BodyTooLarge)?;

    let request_id = parts
        .headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    let upstream = state
        .upstream
        .request(parts.method.clone(), &url)
        .headers(forwardable(&parts.headers))
        .with_trace_context(request_id)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(url = %url, error = %e, "Upstream request failed");
            GateError::Upstream("upstream unavailable".to_string())
        })?;

    let status = upstream.status();
    record_upstream_status(status.as_u16());
    let headers = forwardable(upstream.headers());
    let bytes = upstream.bytes().await.map_err(|e| {
        tracing::error!(url = %url, error = %e, "Failed to read upstream body");
        GateError::Upstream("upstream body unreadable".to_string())
    })?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn hop_by_hop_and_host_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gate.local"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::COOKIE, HeaderValue::from_static("a=b"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));

        let out = forwardable(&headers);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get("keep-alive").is_none());
        assert_eq!(out.get(header::COOKIE).unwrap(), "a=b");
        assert_eq!(out.get(header::AUTHORIZATION).unwrap(), "Bearer t");
    }
}
