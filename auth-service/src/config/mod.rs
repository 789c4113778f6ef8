use service_core::config::{self as core_config, get_env, parse_env};
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub mfa: MfaConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub throttle: ThrottleConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub temp_token_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a revoked session keeps authorizing in-flight requests.
    pub revocation_grace_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct MfaConfig {
    /// Issuer label shown by authenticator apps.
    pub totp_issuer: String,
    pub backup_code_count: usize,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub internal_api_secret: String,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwaggerMode {
    Public,
    Disabled,
}

/// Per-account failure counters for password and MFA attempts.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub max_failed_attempts: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub mfa_attempts: u32,
    pub mfa_window_seconds: u64,
    pub refresh_attempts: u32,
    pub refresh_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("auth-service"), is_prod)?,
            service_version: get_env(
                "SERVICE_VERSION",
                Some(env!("CARGO_PKG_VERSION")),
                is_prod,
            )?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
                run_migrations: parse_env("DATABASE_RUN_MIGRATIONS", Some("true"), is_prod)?,
            },
            redis: env::var("REDIS_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|url| RedisConfig { url }),
            jwt: JwtConfig {
                private_key_path: get_env("JWT_PRIVATE_KEY_PATH", None, is_prod)?,
                public_key_path: get_env("JWT_PUBLIC_KEY_PATH", None, is_prod)?,
                issuer: get_env("JWT_ISSUER", Some("auth-service"), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    is_prod,
                )?,
                temp_token_expiry_minutes: parse_env(
                    "JWT_TEMP_TOKEN_EXPIRY_MINUTES",
                    Some("5"),
                    is_prod,
                )?,
            },
            session: SessionConfig {
                revocation_grace_seconds: parse_env(
                    "SESSION_REVOCATION_GRACE_SECONDS",
                    Some("30"),
                    is_prod,
                )?,
            },
            mfa: MfaConfig {
                totp_issuer: get_env("MFA_TOTP_ISSUER", Some("Auth Service"), is_prod)?,
                backup_code_count: parse_env("MFA_BACKUP_CODE_COUNT", Some("10"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                internal_api_secret: get_env("INTERNAL_API_SECRET", None, is_prod)?,
                secure_cookies: parse_env(
                    "SECURE_COOKIES",
                    Some(if is_prod { "true" } else { "false" }),
                    is_prod,
                )?,
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            throttle: ThrottleConfig {
                max_failed_attempts: parse_env("THROTTLE_MAX_FAILED_ATTEMPTS", Some("5"), is_prod)?,
                window_seconds: parse_env("THROTTLE_WINDOW_SECONDS", Some("900"), is_prod)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("10"), is_prod)?,
                login_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
                mfa_attempts: parse_env("RATE_LIMIT_MFA_ATTEMPTS", Some("10"), is_prod)?,
                mfa_window_seconds: parse_env("RATE_LIMIT_MFA_WINDOW_SECONDS", Some("60"), is_prod)?,
                refresh_attempts: parse_env("RATE_LIMIT_REFRESH_ATTEMPTS", Some("30"), is_prod)?,
                refresh_window_seconds: parse_env(
                    "RATE_LIMIT_REFRESH_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
            },
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

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.jwt.temp_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_TEMP_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.session.revocation_grace_seconds < 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_REVOCATION_GRACE_SECONDS must not be negative"
            )));
        }

        if self.throttle.max_failed_attempts == 0 || self.throttle.window_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "THROTTLE_MAX_FAILED_ATTEMPTS and THROTTLE_WINDOW_SECONDS must be positive"
            )));
        }

        if self.internal_secret_too_short() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INTERNAL_API_SECRET must be at least 32 characters"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !self.security.secure_cookies {
                tracing::warn!("SECURE_COOKIES is disabled in production");
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::error!(
                    "Swagger is publicly accessible in production - consider disabling it"
                );
            }
        }

        Ok(())
    }

    fn internal_secret_too_short(&self) -> bool {
        self.security.internal_api_secret.len() < 32
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
