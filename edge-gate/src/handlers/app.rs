use axum::Json;
use serde_json::{json, Value};

/// Liveness of the gate itself; says nothing about the upstream.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "edge-gate",
    }))
}
