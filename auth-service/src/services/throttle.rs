//! Failed-attempt throttling for password and MFA checks.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::ThrottleConfig;
use crate::services::AuthError;

/// Attempt count inside the current fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptWindow {
    pub count: u32,
    pub resets_in: Duration,
}

#[async_trait]
pub trait AttemptCounter: Send + Sync {
    /// Count one attempt, opening a new window of `window` if none is active,
    /// and return the window as it stands after the increment.
    ///
    /// The read and the write are one atomic step.
    async fn increment(&self, key: &str, window: Duration) -> Result<AttemptWindow, anyhow::Error>;
    async fn clear(&self, key: &str) -> Result<(), anyhow::Error>;
}

/// Process-local counters.
#[derive(Default)]
pub struct InMemoryAttemptCounter {
    entries: DashMap<String, (u32, Instant, Duration)>,
}

impl InMemoryAttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptCounter for InMemoryAttemptCounter {
    async fn increment(&self, key: &str, window: Duration) -> Result<AttemptWindow, anyhow::Error> {
        // The entry guard holds the shard lock until the count is read back.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert((0, Instant::now(), window));
        if entry.1.elapsed() >= entry.2 {
            *entry = (0, Instant::now(), window);
        }
        entry.0 += 1;
        let (count, started, window) = *entry;
        Ok(AttemptWindow {
            count,
            resets_in: window.saturating_sub(started.elapsed()),
        })
    }

    async fn clear(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Counters shared by every instance through Redis.
#[derive(Clone)]
pub struct RedisAttemptCounter {
    manager: ConnectionManager,
}

impl RedisAttemptCounter {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to get Redis connection manager");
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");
        Ok(Self { manager })
    }

    fn key(key: &str) -> String {
        format!("auth:attempts:{}", key)
    }
}

#[async_trait]
impl AttemptCounter for RedisAttemptCounter {
    async fn increment(&self, key: &str, window: Duration) -> Result<AttemptWindow, anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = Self::key(key);

        let (count, ttl): (u32, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("NX")
            .arg("EX")
            .arg(window.as_secs().max(1))
            .ignore()
            .cmd("INCR")
            .arg(&key)
            .cmd("TTL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to increment attempt counter: {}", e))?;

        Ok(AttemptWindow {
            count,
            resets_in: Duration::from_secs(ttl.max(0) as u64),
        })
    }

    async fn clear(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(Self::key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to clear attempt counter: {}", e))
    }
}

/// Blocks an account after too many attempts inside one window.
///
/// Every attempt is counted before the credential is checked and a success
/// clears the count, so only failures accumulate. Counting and comparing in
/// one increment means concurrent requests cannot all slip in under the limit.
/// Counter backend failures are logged and do not block logins.
#[derive(Clone)]
pub struct LoginThrottle {
    counter: Arc<dyn AttemptCounter>,
    max_failures: u32,
    window: Duration,
}

impl LoginThrottle {
    pub fn new(counter: Arc<dyn AttemptCounter>, config: &ThrottleConfig) -> Self {
        Self {
            counter,
            max_failures: config.max_failed_attempts,
            window: Duration::from_secs(config.window_seconds),
        }
    }

    pub fn password_key(tenant_id: Option<Uuid>, email: &str) -> String {
        let tenant = tenant_id.map_or_else(|| "any".to_string(), |t| t.to_string());
        format!("pwd:{}:{}", tenant, email.trim().to_lowercase())
    }

    pub fn mfa_key(user_id: Uuid) -> String {
        format!("mfa:{}", user_id)
    }

    /// Reserve one attempt under `key`, refusing once the window is spent.
    pub async fn begin_attempt(&self, key: &str) -> Result<(), AuthError> {
        match self.counter.increment(key, self.window).await {
            Ok(window) if window.count > self.max_failures => Err(AuthError::TooManyAttempts {
                retry_after: Some(window.resets_in.as_secs().max(1)),
            }),
            Ok(window) => {
                if window.count == self.max_failures {
                    tracing::warn!(key = %key, attempts = window.count, "Attempt limit reached");
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Attempt counter unavailable, skipping throttle check");
                Ok(())
            }
        }
    }

    pub async fn clear(&self, key: &str) {
        if let Err(e) = self.counter.clear(key).await {
            tracing::error!(error = %e, "Failed to clear attempt counter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(max: u32) -> LoginThrottle {
        LoginThrottle::new(
            Arc::new(InMemoryAttemptCounter::new()),
            &ThrottleConfig {
                max_failed_attempts: max,
                window_seconds: 900,
            },
        )
    }

    #[tokio::test]
    async fn blocks_after_max_failures() {
        let throttle = throttle(3);
        let key = LoginThrottle::mfa_key(Uuid::new_v4());

        for _ in 0..3 {
            assert!(throttle.begin_attempt(&key).await.is_ok());
        }

        match throttle.begin_attempt(&key).await {
            Err(AuthError::TooManyAttempts { retry_after }) => {
                assert!(retry_after.unwrap() <= 900);
            }
            other => panic!("expected throttling, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn clear_resets_the_window() {
        let throttle = throttle(1);
        let key = LoginThrottle::password_key(None, "A@X.com ");
        assert_eq!(key, "pwd:any:a@x.com");

        assert!(throttle.begin_attempt(&key).await.is_ok());
        assert!(throttle.begin_attempt(&key).await.is_err());

        throttle.clear(&key).await;
        assert!(throttle.begin_attempt(&key).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_attempts_never_exceed_the_limit() {
        let throttle = throttle(5);
        let key = LoginThrottle::password_key(None, "race@x.com");

        let attempts = (0..50).map(|_| {
            let throttle = throttle.clone();
            let key = key.clone();
            tokio::spawn(async move { throttle.begin_attempt(&key).await.is_ok() })
        });
        let admitted = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();

        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn expired_windows_start_over() {
        let counter = InMemoryAttemptCounter::new();
        counter.increment("k", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let window = counter.increment("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(window.count, 1);
        assert!(window.resets_in <= Duration::from_secs(60));
    }
}
