use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Read `exp` from an access token without verifying it.
///
/// `None` for anything that does not look like a JWT; callers treat that as expired.
pub fn access_token_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice::<ExpiryClaim>(&bytes)
        .ok()
        .map(|c| c.exp)
}
