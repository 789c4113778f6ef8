use serde::Deserialize;
use service_core::config::{self as core_config, get_env, parse_env};
use service_core::error::AppError;
use std::env;

use crate::utils::jwt::EdgeClaims;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub common: core_config::Config,
    pub is_prod: bool,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub auth_service: AuthServiceSettings,
    pub upstream: UpstreamSettings,
    pub redirects: RedirectSettings,
    pub alert_webhook_url: Option<String>,
    pub privileged_rules: Vec<PrivilegedRule>,
}

#[derive(Debug, Clone)]
pub struct AuthServiceSettings {
    /// Base URL of auth-service as reachable from the gate.
    pub url: String,
    pub internal_api_secret: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub url: String,
    pub timeout_seconds: u64,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct RedirectSettings {
    pub login_path: String,
    /// Where browsers land after a coarse authorization failure.
    pub safe_path: String,
}

/// A path prefix that needs a live session plus any one of the listed roles or
/// permissions. Empty lists mean "any authenticated user".
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegedRule {
    pub prefix: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl PrivilegedRule {
    /// Segment-aware prefix match: `/admin` covers `/admin` and `/admin/x`, not `/administrator`.
    ///
    /// Expects a canonical path. Letters compare case-insensitively so an upstream
    /// with case-folding routes cannot be reached around the rule.
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.get(..prefix.len()) {
            Some(head) if head.eq_ignore_ascii_case(prefix) => {
                let rest = &path[prefix.len()..];
                rest.is_empty() || rest.starts_with('/')
            }
            _ => false,
        }
    }

    pub fn admits(&self, claims: &EdgeClaims) -> bool {
        if self.roles.is_empty() && self.permissions.is_empty() {
            return true;
        }
        self.roles.iter().any(|r| claims.roles.contains(r))
            || self.permissions.iter().any(|p| claims.permissions.contains(p))
    }
}

impl GateConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let common = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT")
            .map(|v| v.eq_ignore_ascii_case("prod") || v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let rules_json = get_env("PRIVILEGED_RULES", Some("[]"), is_prod)?;

        let config = GateConfig {
            common,
            is_prod,
            service_name: get_env("SERVICE_NAME", Some("edge-gate"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            auth_service: AuthServiceSettings {
                url: get_env("AUTH_SERVICE_URL", Some("http://localhost:8080"), is_prod)?,
                internal_api_secret: get_env("INTERNAL_API_SECRET", None, is_prod)?,
                timeout_seconds: parse_env("AUTH_SERVICE_TIMEOUT_SECONDS", Some("5"), is_prod)?,
            },
            upstream: UpstreamSettings {
                url: get_env("UPSTREAM_URL", Some("http://localhost:3000"), is_prod)?,
                timeout_seconds: parse_env("UPSTREAM_TIMEOUT_SECONDS", Some("30"), is_prod)?,
                max_body_bytes: parse_env("UPSTREAM_MAX_BODY_BYTES", Some("10485760"), is_prod)?,
            },
            redirects: RedirectSettings {
                login_path: get_env("LOGIN_PATH", Some("/login"), is_prod)?,
                safe_path: get_env("SAFE_REDIRECT_PATH", Some("/"), is_prod)?,
            },
            alert_webhook_url: env::var("ALERT_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            privileged_rules: parse_rules(&rules_json)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.auth_service.internal_api_secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INTERNAL_API_SECRET must be at least 32 characters"
            )));
        }

        for (key, path) in [
            ("LOGIN_PATH", &self.redirects.login_path),
            ("SAFE_REDIRECT_PATH", &self.redirects.safe_path),
        ] {
            // Relative only, so redirects can never leave this origin.
            if !path.starts_with('/') || path.starts_with("//") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be a local absolute path",
                    key
                )));
            }
        }

        if self.privileged_rules.iter().any(|r| !r.prefix.starts_with('/')) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PRIVILEGED_RULES prefixes must start with '/'"
            )));
        }

        Ok(())
    }

    /// First rule matching `path`, in configuration order.
    pub fn rule_for(&self, path: &str) -> Option<&PrivilegedRule> {
        self.privileged_rules.iter().find(|r| r.matches(path))
    }
}

pub fn parse_rules(json: &str) -> Result<Vec<PrivilegedRule>, AppError> {
    serde_json::from_str(json)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("PRIVILEGED_RULES: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(prefix: &str, roles: &[&str], permissions: &[&str]) -> PrivilegedRule {
        PrivilegedRule {
            prefix: prefix.to_string(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn claims(roles: &[&str], permissions: &[&str]) -> EdgeClaims {
        EdgeClaims {
            sub: "u".to_string(),
            tenant_id: None,
            roles: roles.iter().map(|s| s.to_string()).collect(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
            sid: None,
            aud: "access".to_string(),
            exp: 0,
        }
    }

    #[test]
    fn prefix_matching_respects_segments() {
        let admin = rule("/admin", &[], &[]);
        assert!(admin.matches("/admin"));
        assert!(admin.matches("/admin/users"));
        assert!(!admin.matches("/administrator"));
        assert!(!admin.matches("/"));

        let trailing = rule("/api/admin/", &[], &[]);
        assert!(trailing.matches("/api/admin/x"));
        assert!(trailing.matches("/api/admin"));
    }

    #[test]
    fn prefix_matching_ignores_letter_case() {
        let admin = rule("/admin", &[], &[]);
        assert!(admin.matches("/ADMIN"));
        assert!(admin.matches("/Admin/panel"));
        assert!(!admin.matches("/ADMINISTRATOR"));
        assert!(!admin.matches("/adm"));
    }

    #[test]
    fn any_listed_role_or_permission_admits() {
        let r = rule("/admin", &["admin"], &["USER_MANAGE"]);
        assert!(r.admits(&claims(&["admin"], &[])));
        assert!(r.admits(&claims(&[], &["USER_MANAGE"])));
        assert!(!r.admits(&claims(&["viewer"], &["USER_VIEW"])));
        assert!(rule("/me", &[], &[]).admits(&claims(&[], &[])));
    }

    #[test]
    fn rules_parse_from_json() {
        let rules =
            parse_rules(r#"[{"prefix":"/admin","roles":["admin"]},{"prefix":"/billing"}]"#)
                .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].roles, vec!["admin".to_string()]);
        assert!(rules[1].permissions.is_empty());
        assert!(parse_rules("{").is_err());
    }
}
