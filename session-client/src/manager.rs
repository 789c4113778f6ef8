use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_core::observability::TraceContextExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::store::RefreshTokenStore;
use crate::token::access_token_expiry;

type RefreshFlight = Shared<BoxFuture<'static, Result<(), ClientError>>>;
pub type ExpiryHook = Arc<dyn Fn() + Send + Sync>;

/// Token pair plus profile, as returned by `/login`, `/mfa/verify` and `/refresh`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub user: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// Session established; carries the user profile.
    Authenticated(Value),
    /// Second factor needed before a session is issued.
    MfaRequired {
        setup_required: bool,
        temp_token: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeBody {
    #[serde(default)]
    mfa_required: bool,
    #[serde(default)]
    setup_required: bool,
    temp_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

struct Inner {
    http: Client,
    config: ClientConfig,
    store: Arc<dyn RefreshTokenStore>,
    access: RwLock<Option<Secret<String>>>,
    in_flight: Mutex<Option<RefreshFlight>>,
    on_session_expired: Option<ExpiryHook>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn current_access(&self) -> Option<String> {
        self.access
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.expose_secret().clone())
    }

    fn set_access(&self, token: Option<String>) {
        *self.access.write().unwrap_or_else(PoisonError::into_inner) = token.map(Secret::new);
    }

    async fn install(&self, tokens: &TokenResponse) -> Result<(), ClientError> {
        self.set_access(Some(tokens.access_token.clone()));
        self.store.save(&tokens.refresh_token).await
    }

    /// Drop both tokens and tell the application the user must sign in again.
    async fn teardown(&self) {
        self.set_access(None);
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear refresh token");
        }
        if let Some(hook) = &self.on_session_expired {
            hook();
        }
    }

    /// One `/refresh` round trip. Only ever runs inside a shared flight.
    async fn rotate(&self) -> Result<(), ClientError> {
        let Some(refresh) = self.store.load().await? else {
            self.teardown().await;
            return Err(ClientError::LoginRequired);
        };

        let response = self
            .http
            .post(self.config.url("/refresh"))
            .with_trace_context(None)
            .json(&RefreshBody {
                refresh_token: refresh.expose_secret(),
            })
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            let tokens: TokenResponse = response
                .json()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()))?;
            self.install(&tokens).await?;
            tracing::debug!("Session refreshed");
            return Ok(());
        }

        let err = ClientError::from_response(response).await;
        if err.is_transient() {
            tracing::warn!(status = %status, "Refresh failed, session kept for another attempt");
            return Err(err);
        }

        tracing::info!(status = %status, "Refresh rejected, ending session");
        self.teardown().await;
        Err(ClientError::LoginRequired)
    }
}

/// Client-resident session coordinator.
///
/// Holds the access token in memory and the refresh token in a
/// [`RefreshTokenStore`]. Concurrent callers that need a refresh share one
/// in-flight rotation, so a single-use refresh token is never spent twice.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(config: ClientConfig, store: Arc<dyn RefreshTokenStore>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self::with_client(http, config, store, None))
    }

    pub fn with_client(
        http: Client,
        config: ClientConfig,
        store: Arc<dyn RefreshTokenStore>,
        on_session_expired: Option<ExpiryHook>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                store,
                access: RwLock::new(None),
                in_flight: Mutex::new(None),
                on_session_expired,
            }),
        }
    }

    /// Install the hook run whenever a failed refresh tears the session down.
    /// Call it while building the manager; in-memory state is not carried over.
    pub fn on_session_expired(self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self::with_client(
            self.inner.http.clone(),
            self.inner.config.clone(),
            self.inner.store.clone(),
            Some(Arc::new(hook)),
        )
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn has_access_token(&self) -> bool {
        self.inner.current_access().is_some()
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        tenant_id: Option<Uuid>,
    ) -> Result<LoginOutcome, ClientError> {
        let response = self
            .inner
            .http
            .post(self.inner.config.url("/login"))
            .with_trace_context(None)
            .json(&LoginBody {
                email,
                password,
                tenant_id,
            })
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        let challenge: ChallengeBody =
            serde_json::from_value(body.clone()).map_err(|e| ClientError::Parse(e.to_string()))?;
        if challenge.mfa_required {
            let temp_token = challenge
                .temp_token
                .ok_or_else(|| ClientError::Parse("MFA challenge without tempToken".into()))?;
            return Ok(LoginOutcome::MfaRequired {
                setup_required: challenge.setup_required,
                temp_token,
            });
        }

        let tokens: TokenResponse =
            serde_json::from_value(body).map_err(|e| ClientError::Parse(e.to_string()))?;
        self.inner.install(&tokens).await?;
        Ok(LoginOutcome::Authenticated(tokens.user))
    }

    /// Complete an MFA challenge with a TOTP or backup code.
    pub async fn verify_mfa(&self, temp_token: &str, code: &str) -> Result<Value, ClientError> {
        let response = self
            .inner
            .http
            .post(self.inner.config.url("/mfa/verify"))
            .with_trace_context(None)
            .json(&serde_json::json!({ "tempToken": temp_token, "code": code }))
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        self.inner.install(&tokens).await?;
        Ok(tokens.user)
    }

    /// Revoke the session server-side (best effort) and forget both tokens.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let refresh = self.inner.store.load().await?;

        if let Some(refresh) = refresh {
            let result = self
                .inner
                .http
                .post(self.inner.config.url("/logout"))
                .with_trace_context(None)
                .json(&RefreshBody {
                    refresh_token: refresh.expose_secret(),
                })
                .send()
                .await;
            match result {
                Ok(res) if !res.status().is_success() => {
                    tracing::warn!(status = %res.status(), "Logout rejected by server");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Logout request failed"),
            }
        }

        self.inner.set_access(None);
        self.inner.store.clear().await
    }

    /// Send an authenticated request built by `build`.
    ///
    /// Refreshes first when the access token is about to expire. A 401 triggers
    /// one refresh and one retry; a second 401 is returned to the caller.
    pub async fn send<F>(&self, build: F) -> Result<Response, ClientError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.fresh_access_token().await?;
        let response = self.send_with(&build, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!("Access token rejected, refreshing once");
        self.refresh(Some(token)).await?;
        let token = self
            .inner
            .current_access()
            .ok_or(ClientError::LoginRequired)?;

        let retried = self.send_with(&build, &token).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::from_response(retried).await);
        }
        Ok(retried)
    }

    /// GET `path` on the configured base URL and decode the JSON body.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.inner.config.url(path);
        let response = self.send(|http| http.get(&url)).await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn send_with<F>(&self, build: &F, token: &str) -> Result<Response, ClientError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        build(&self.inner.http)
            .bearer_auth(token)
            .with_trace_context(None)
            .send()
            .await
            .map_err(ClientError::from_transport)
    }

    /// Current access token, refreshed first if it is missing or near expiry.
    pub async fn fresh_access_token(&self) -> Result<String, ClientError> {
        let current = self.inner.current_access();
        if let Some(token) = current.as_deref() {
            if !self.expires_soon(token) {
                return Ok(token.to_string());
            }
        }

        self.refresh(current).await?;
        self.inner
            .current_access()
            .ok_or(ClientError::LoginRequired)
    }

    fn expires_soon(&self, token: &str) -> bool {
        let buffer = self.inner.config.refresh_buffer.as_secs() as i64;
        match access_token_expiry(token) {
            Some(exp) => exp - Utc::now().timestamp() <= buffer,
            None => true,
        }
    }

    /// Join the in-flight rotation or start one.
    ///
    /// `seen` is the access token the caller judged stale. If no rotation is
    /// running and the token has already changed, someone else refreshed and
    /// there is nothing to do.
    async fn refresh(&self, seen: Option<String>) -> Result<(), ClientError> {
        let flight = {
            let mut slot = lock(&self.inner.in_flight);
            match slot.as_ref() {
                Some(flight) => flight.clone(),
                None => {
                    if self.inner.current_access() != seen {
                        return Ok(());
                    }
                    let inner = self.inner.clone();
                    let flight = async move {
                        let result = inner.rotate().await;
                        *lock(&inner.in_flight) = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };
        flight.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    fn token_expiring_in(secs: i64) -> String {
        let payload = format!(r#"{{"exp":{}}}"#, Utc::now().timestamp() + secs);
        format!("h.{}.s", URL_SAFE_NO_PAD.encode(payload))
    }

    fn manager() -> SessionManager {
        SessionManager::new(
            ClientConfig::new("http://127.0.0.1:1"),
            Arc::new(MemoryTokenStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn expiry_buffer_is_inclusive() {
        let m = manager();
        assert!(m.expires_soon(&token_expiring_in(10)));
        assert!(m.expires_soon(&token_expiring_in(30)));
        assert!(!m.expires_soon(&token_expiring_in(120)));
        assert!(m.expires_soon("opaque"));
    }

    #[tokio::test]
    async fn refresh_is_skipped_when_token_already_changed() {
        let m = manager();
        m.inner.set_access(Some("new".to_string()));
        // Would hit the unreachable server if it tried to rotate.
        m.refresh(Some("old".to_string())).await.unwrap();
        assert_eq!(m.inner.current_access().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn missing_refresh_token_means_login_required() {
        let m = manager();
        assert_eq!(
            m.fresh_access_token().await,
            Err(ClientError::LoginRequired)
        );
    }
}
