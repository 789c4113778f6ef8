pub mod alert;
pub mod auth_client;
pub mod metrics;

pub use alert::{AlertNotifier, SecurityAlert, PRIVILEGED_ACCESS_DENIED};
pub use auth_client::AuthClient;
