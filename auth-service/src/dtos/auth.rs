use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "a@x.com")]
    pub email: String,

    #[validate(length(min = 1, max = 1024, message = "Password is required"))]
    #[schema(example = "Secret1")]
    pub password: String,

    /// Disambiguates an email registered in several tenants
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MfaSetupRequest {
    #[validate(length(min = 1, message = "Temp token is required"))]
    pub temp_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MfaVerifyRequest {
    #[validate(length(min = 1, message = "Temp token is required"))]
    pub temp_token: String,

    /// Six-digit TOTP code or a backup code
    #[validate(length(min = 6, max = 32, message = "Code must be 6 to 32 characters"))]
    #[schema(example = "123456")]
    pub code: String,
}

/// Body of `/refresh` and `/logout`; the token falls back to the cookie.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SessionValidateRequest {
    pub sid: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "revoked")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeSessionsResponse {
    pub revoked: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_accepts_camel_case_tenant() {
        let tenant = Uuid::new_v4();
        let body = serde_json::json!({
            "email": "a@x.com",
            "password": "Secret1",
            "tenantId": tenant,
        });
        let req: LoginRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.tenant_id, Some(tenant));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn login_request_rejects_bad_email() {
        let req = LoginRequest {
            email: "not-an-email".into(),
            password: "Secret1".into(),
            tenant_id: None,
        };
        assert!(req.validate().is_err());
    }
}
