use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use crate::AppState;

pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

/// Gate for service-to-service routes: the shared secret must match exactly.
pub async fn internal_secret_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = req
        .headers()
        .get(INTERNAL_SECRET_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();

    if !secret_matches(presented, state.config.security.internal_api_secret.as_bytes()) {
        tracing::warn!(path = %req.uri().path(), "Internal call with missing or wrong secret");
        return Err(AppError::Unauthorized(anyhow::anyhow!("Unauthorized")));
    }

    Ok(next.run(req).await)
}

fn secret_matches(presented: &[u8], expected: &[u8]) -> bool {
    !expected.is_empty() && bool::from(presented.ct_eq(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_compare() {
        assert!(secret_matches(b"s3cret", b"s3cret"));
        assert!(!secret_matches(b"s3cre", b"s3cret"));
        assert!(!secret_matches(b"", b""));
    }
}
