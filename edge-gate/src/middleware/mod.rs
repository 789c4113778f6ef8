pub mod gate;

pub use gate::{gate_middleware, RequestContext, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
