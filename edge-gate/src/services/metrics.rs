use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static GATE_DECISIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static UPSTREAM_RESPONSES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Register all collectors. Later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let decisions = IntCounterVec::new(
        Opts::new("edge_gate_decisions_total", "Gate outcomes per request"),
        &["decision"],
    )?;

    let upstream = IntCounterVec::new(
        Opts::new(
            "edge_gate_upstream_responses_total",
            "Responses received from the upstream app",
        ),
        &["status"],
    )?;

    registry.register(Box::new(decisions.clone()))?;
    registry.register(Box::new(upstream.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = GATE_DECISIONS_TOTAL.set(decisions);
    let _ = UPSTREAM_RESPONSES_TOTAL.set(upstream);
    Ok(())
}

pub fn record_decision(decision: &str) {
    if let Some(counter) = GATE_DECISIONS_TOTAL.get() {
        counter.with_label_values(&[decision]).inc();
    }
}

pub fn record_upstream_status(status: u16) {
    if let Some(counter) = UPSTREAM_RESPONSES_TOTAL.get() {
        counter.with_label_values(&[&status.to_string()]).inc();
    }
}

pub fn get_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        tracing::error!("Metrics registry not initialized");
        return "# Metrics registry not initialized\n".to_string();
    };

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
        format!("# Failed to convert metrics to UTF-8: {}\n", e)
    })
}
