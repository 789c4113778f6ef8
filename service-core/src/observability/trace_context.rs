//! W3C trace context propagation for outbound HTTP calls.
//!
//! The gate's delegated session check, its upstream proxy and the session
//! client all go through [`TraceContextExt::with_trace_context`] so one login
//! or refresh shows up as a single trace across the services.

use opentelemetry::trace::TraceContextExt as _;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `traceparent`/`tracestate` for the current span, plus `x-request-id` when given.
///
/// Empty when there is no sampled OpenTelemetry span in scope.
pub fn propagation_headers(request_id: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let context = Span::current().context();
    let span_context = context.span().span_context().clone();
    if span_context.is_valid() {
        let traceparent = format!(
            "00-{}-{}-{:02x}",
            span_context.trace_id(),
            span_context.span_id(),
            span_context.trace_flags().to_u8()
        );
        if let Ok(value) = HeaderValue::from_str(&traceparent) {
            headers.insert(TRACEPARENT_HEADER, value);
        }

        let tracestate = span_context.trace_state().header();
        if !tracestate.is_empty()
            && let Ok(value) = HeaderValue::from_str(&tracestate)
        {
            headers.insert(TRACESTATE_HEADER, value);
        }
    }

    if let Some(id) = request_id
        && let Ok(value) = HeaderValue::from_str(id)
    {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    headers
}

/// Attach propagation headers to an outbound request.
pub trait TraceContextExt {
    fn with_trace_context(self, request_id: Option<&str>) -> Self;
}

impl TraceContextExt for reqwest::RequestBuilder {
    fn with_trace_context(self, request_id: Option<&str>) -> Self {
        self.headers(propagation_headers(request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_span_means_no_trace_headers() {
        let headers = propagation_headers(None);
        assert!(headers.get(TRACEPARENT_HEADER).is_none());
        assert!(headers.is_empty());
    }

    #[test]
    fn request_id_is_forwarded() {
        let headers = propagation_headers(Some("abc-123"));
        assert_eq!(headers.get(REQUEST_ID_HEADER).unwrap(), "abc-123");
    }

    #[test]
    fn invalid_request_id_is_dropped() {
        let headers = propagation_headers(Some("bad\nvalue"));
        assert!(headers.get(REQUEST_ID_HEADER).is_none());
    }
}
