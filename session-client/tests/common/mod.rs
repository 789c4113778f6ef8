#![allow(dead_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde_json::{json, Value};
use session_client::{ClientConfig, MemoryTokenStore, RefreshTokenStore, SessionManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::{
    matchers::{body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Unsigned token with `exp` `ttl_secs` from now. Only `exp` matters to the client.
pub fn access_token(label: &str, ttl_secs: i64) -> String {
    let payload = json!({ "sub": label, "exp": Utc::now().timestamp() + ttl_secs });
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

pub fn token_body(access: &str, refresh: &str) -> Value {
    json!({
        "accessToken": access,
        "refreshToken": refresh,
        "tokenType": "Bearer",
        "expiresIn": 900,
        "user": { "email": "a@x.com", "mfaEnabled": false },
    })
}

pub struct TestClient {
    pub server: MockServer,
    pub store: Arc<MemoryTokenStore>,
    pub session: SessionManager,
    pub expired_calls: Arc<AtomicUsize>,
}

impl TestClient {
    pub async fn spawn() -> Self {
        Self::spawn_with_store(Arc::new(MemoryTokenStore::new())).await
    }

    pub async fn spawn_with_store(store: Arc<MemoryTokenStore>) -> Self {
        let server = MockServer::start().await;
        let expired_calls = Arc::new(AtomicUsize::new(0));
        let counter = expired_calls.clone();
        let session = SessionManager::new(ClientConfig::new(server.uri()), store.clone())
            .expect("session manager")
            .on_session_expired(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        Self {
            server,
            store,
            session,
            expired_calls,
        }
    }

    pub fn expirations(&self) -> usize {
        self.expired_calls.load(Ordering::SeqCst)
    }

    pub async fn stored_refresh(&self) -> Option<String> {
        use secrecy::ExposeSecret;
        self.store
            .load()
            .await
            .expect("store")
            .map(|s| s.expose_secret().clone())
    }

    /// `/refresh` exchanging `from` for a new pair, expected exactly `times` times.
    pub async fn mount_refresh(&self, from: &str, access: &str, refresh: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/refresh"))
            .and(body_json(json!({ "refreshToken": from })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access, refresh)))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_login(&self, access: &str, refresh: &str) {
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access, refresh)))
            .mount(&self.server)
            .await;
    }
}
