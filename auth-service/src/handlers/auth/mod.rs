pub mod mfa;
pub mod session;

pub use mfa::{mfa_setup, mfa_verify};
pub use session::{login, logout, refresh};

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderMap},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::net::{IpAddr, SocketAddr};

use crate::{
    config::AuthConfig, middleware::ACCESS_TOKEN_COOKIE, models::SessionMetadata,
    services::TokenResponse,
};

pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

const MAX_DEVICE_INFO_LEN: usize = 512;

/// Device and network details recorded on a new session.
pub(crate) fn session_metadata(
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> SessionMetadata {
    let device_info = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(MAX_DEVICE_INFO_LEN).collect::<String>())
        .filter(|ua| !ua.is_empty());

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    let ip_address = forwarded
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip()))
        .map(|ip| ip.to_string());

    SessionMetadata {
        device_info,
        ip_address,
    }
}

/// Set both token cookies from a freshly issued pair.
pub(crate) fn with_token_cookies(
    jar: CookieJar,
    tokens: &TokenResponse,
    config: &AuthConfig,
) -> CookieJar {
    let access_max_age = time::Duration::seconds(tokens.expires_in);
    let refresh_max_age = time::Duration::days(config.jwt.refresh_token_expiry_days);

    jar.add(
        Cookie::build((ACCESS_TOKEN_COOKIE, tokens.access_token.clone()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(config.security.secure_cookies)
            .path("/")
            .max_age(access_max_age),
    )
    .add(
        Cookie::build((REFRESH_TOKEN_COOKIE, tokens.refresh_token.clone()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(config.security.secure_cookies)
            .path("/")
            .max_age(refresh_max_age),
    )
}

pub(crate) fn without_token_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/"))
}
