//! Client-side session handling for the auth service.
//!
//! ```no_run
//! # async fn demo() -> Result<(), session_client::ClientError> {
//! use session_client::{ClientConfig, FileTokenStore, LoginOutcome, SessionManager};
//! use std::sync::Arc;
//!
//! let store = Arc::new(FileTokenStore::new("/tmp/session.json"));
//! let session = SessionManager::new(ClientConfig::new("http://localhost:8080"), store)?
//!     .on_session_expired(|| eprintln!("signed out"));
//!
//! if let LoginOutcome::MfaRequired { temp_token, .. } =
//!     session.login("a@x.com", "Secret1", None).await?
//! {
//!     session.verify_mfa(&temp_token, "123456").await?;
//! }
//! let me: serde_json::Value = session.get_json("/me").await?;
//! # let _ = me;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod store;
pub mod token;

pub use config::ClientConfig;
pub use error::ClientError;
pub use manager::{LoginOutcome, SessionManager, TokenResponse};
pub use store::{FileTokenStore, MemoryTokenStore, RefreshTokenStore};
