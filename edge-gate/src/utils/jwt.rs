use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

use crate::error::GateError;

const ACCESS_AUDIENCE: &str = "access";

/// The coarse subset of access-token claims the gate looks at.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeClaims {
    pub sub: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub aud: String,
    pub exp: i64,
}

/// Decode access-token claims without checking the signature.
///
/// The gate has no verification key. Anything it lets through is still
/// checked by auth-service, so these claims only drive fast rejects.
pub fn decode_unverified(token: &str, now_unix: i64) -> Result<EdgeClaims, GateError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(GateError::MalformedToken("expected three segments".into()));
    }

    let payload = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| GateError::MalformedToken(format!("payload encoding: {}", e)))?;

    let claims: EdgeClaims = serde_json::from_slice(&payload)
        .map_err(|e| GateError::MalformedToken(format!("payload json: {}", e)))?;

    // Temp tokens carry a different audience and must never pass as access tokens.
    if claims.aud != ACCESS_AUDIENCE {
        return Err(GateError::MalformedToken("not an access token".into()));
    }

    if claims.exp <= now_unix {
        return Err(GateError::ExpiredToken);
    }

    Ok(claims)
}

#[cfg(test)]
pub(crate) fn encode_unsigned(payload: &serde_json::Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.sig", header, body)
}
