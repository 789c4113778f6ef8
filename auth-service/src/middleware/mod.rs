pub mod auth;
pub mod internal;
pub mod metrics;

pub use auth::{auth_middleware, bearer_or_cookie, AuthUser, ACCESS_TOKEN_COOKIE};
pub use internal::{internal_secret_middleware, INTERNAL_SECRET_HEADER};
pub use metrics::metrics_middleware;
