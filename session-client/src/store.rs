use async_trait::async_trait;
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::ClientError;

/// Durable home of the refresh token. The access token never goes here.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<Secret<String>>, ClientError>;
    async fn save(&self, token: &str) -> Result<(), ClientError>;
    async fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<Secret<String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: RwLock::new(Some(Secret::new(token.to_string()))),
        }
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<Secret<String>>, ClientError> {
        Ok(self.token.read().await.clone())
    }

    async fn save(&self, token: &str) -> Result<(), ClientError> {
        *self.token.write().await = Some(Secret::new(token.to_string()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        *self.token.write().await = None;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredToken {
    refresh_token: String,
}

/// JSON file holding `{"refreshToken": ...}`, replaced atomically on save.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn store_error(context: &str, err: impl std::fmt::Display) -> ClientError {
    ClientError::Store(format!("{}: {}", context, err))
}

#[async_trait]
impl RefreshTokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<Secret<String>>, ClientError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_error("read", e)),
        };

        match serde_json::from_slice::<StoredToken>(&bytes) {
            Ok(stored) if !stored.refresh_token.is_empty() => {
                Ok(Some(Secret::new(stored.refresh_token)))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                // A corrupt file is as good as no session.
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding unreadable token file");
                Ok(None)
            }
        }
    }

    async fn save(&self, token: &str) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_error("create dir", e))?;
        }

        let body = serde_json::to_vec(&StoredToken {
            refresh_token: token.to_string(),
        })
        .map_err(|e| store_error("encode", e))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, body)
            .await
            .map_err(|e| store_error("write", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| store_error("chmod", e))?;
        }

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| store_error("rename", e))
    }

    async fn clear(&self) -> Result<(), ClientError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error("remove", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn file_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("session.json"));

        assert!(store.load().await.unwrap().is_none());

        store.save("refresh-1").await.unwrap();
        store.save("refresh-2").await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.expose_secret(), "refresh-2");

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileTokenStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("session.json"));
        store.save("refresh").await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
