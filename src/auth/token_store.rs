//! Durable storage for the session token pair.
//!
//! Every backend stores the access and refresh tokens as one record, so a
//! reader can never observe a new access token paired with an old refresh
//! token. Nothing here talks to the network.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::domain::Session;
use crate::error::ClientError;

/// Persistence seam for the [`Session`].
#[async_trait]
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Reads the whole session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the backend cannot be read.
    async fn load(&self) -> Result<Option<Session>, ClientError>;

    /// Atomically replaces the stored pair.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the write fails; the previous
    /// pair is then still in place.
    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<(), ClientError>;

    /// Removes the stored pair.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the backend cannot be cleared.
    async fn clear(&self) -> Result<(), ClientError>;

    /// Reads the access token.
    ///
    /// # Errors
    ///
    /// Propagates [`TokenStore::load`] failures.
    async fn access_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.load().await?.map(|s| s.access_token))
    }

    /// Reads the refresh token.
    ///
    /// # Errors
    ///
    /// Propagates [`TokenStore::load`] failures.
    async fn refresh_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.load().await?.map(|s| s.refresh_token))
    }
}

/// Process-local store; tokens are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    session: RwLock<Option<Session>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `session`.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<Session>, ClientError> {
        Ok(self.session.read().await.clone())
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<(), ClientError> {
        *self.session.write().await = Some(Session::new(access_token, refresh_token));
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        *self.session.write().await = None;
        Ok(())
    }
}

/// JSON file store with an in-memory cache.
///
/// Writes go to `<path>.tmp` and are renamed over `path`, so a crash never
/// leaves a half-written document behind. The cache lock is held across
/// the write, serializing writers and keeping readers on the last
/// committed pair.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cache: RwLock<Option<Option<Session>>>,
}

impl FileTokenStore {
    /// Creates a store backed by `path`. The file is read lazily.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    async fn read_file(&self) -> Result<Option<Session>, ClientError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<Session>(&bytes) {
                Ok(session) => Ok(Some(session)),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "corrupt token file ignored");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Storage(format!(
                "read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_file(&self, session: &Session) -> Result<(), ClientError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ClientError::Storage(format!("create {}: {e}", dir.display())))?;
        }
        let json = serde_json::to_vec(session)?;
        let tmp = self.temp_path();
        let write_err = |e: std::io::Error| ClientError::Storage(format!("write {}: {e}", tmp.display()));
        let mut file = tokio::fs::File::create(&tmp).await.map_err(write_err)?;
        file.write_all(&json).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ClientError::Storage(format!("rename {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<Session>, ClientError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(cached.clone());
        }
        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref() {
            return Ok(cached.clone());
        }
        let session = self.read_file().await?;
        *cache = Some(session.clone());
        Ok(session)
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<(), ClientError> {
        let session = Session::new(access_token, refresh_token);
        let mut cache = self.cache.write().await;
        self.write_file(&session).await?;
        *cache = Some(Some(session));
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        let mut cache = self.cache.write().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "remove {}: {e}",
                    self.path.display()
                )));
            }
        }
        *cache = Some(None);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::assert_ok;

    fn scratch_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("agrimarket-{tag}-{}", uuid::Uuid::new_v4()))
            .join("session.json")
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert!(matches!(store.load().await, Ok(None)));

        assert_ok!(store.set_session("a1", "r1").await);
        assert_eq!(store.access_token().await, Ok(Some("a1".to_string())));
        assert_eq!(store.refresh_token().await, Ok(Some("r1".to_string())));

        assert_ok!(store.clear().await);
        assert_eq!(store.access_token().await, Ok(None));
    }

    #[tokio::test]
    async fn concurrent_writers_never_mix_pairs() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut tasks = Vec::new();
        for n in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let _ = store
                    .set_session(&format!("access-{n}"), &format!("refresh-{n}"))
                    .await;
                store.load().await
            }));
        }
        for task in tasks {
            let Ok(Ok(Some(session))) = task.await else {
                panic!("load failed");
            };
            let a = session.access_token.trim_start_matches("access-");
            let r = session.refresh_token.trim_start_matches("refresh-");
            assert_eq!(a, r);
        }
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let path = scratch_path("persist");
        let first = FileTokenStore::new(&path);
        assert_ok!(first.set_session("a1", "r1").await);

        let second = FileTokenStore::new(&path);
        let Ok(Some(session)) = second.load().await else {
            panic!("session should be persisted");
        };
        assert_eq!(session.access_token, "a1");
        assert_eq!(session.refresh_token, "r1");

        assert_ok!(second.clear().await);
        assert!(!path.exists());
        assert!(matches!(FileTokenStore::new(&path).load().await, Ok(None)));
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn file_store_replaces_document_without_leftovers() {
        let path = scratch_path("replace");
        let store = FileTokenStore::new(&path);
        assert_ok!(store.set_session("a1", "r1").await);
        assert_ok!(store.set_session("a2", "r2").await);

        let Ok(bytes) = std::fs::read(&path) else {
            panic!("token file should exist");
        };
        let Ok(on_disk) = serde_json::from_slice::<Session>(&bytes) else {
            panic!("token file should hold a complete document");
        };
        assert_eq!(on_disk.access_token, "a2");
        assert_eq!(on_disk.refresh_token, "r2");
        assert!(!store.temp_path().exists());
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn file_store_treats_corrupt_file_as_empty() {
        let path = scratch_path("corrupt");
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let _ = std::fs::write(&path, b"{ not json");
        let store = FileTokenStore::new(&path);
        assert!(matches!(store.load().await, Ok(None)));
        assert_ok!(store.clear().await);
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
