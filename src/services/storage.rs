/// Storage for uploaded book content
///
/// Keys are opaque strings generated by the store. The local backend keeps
/// one file per key under a root directory.
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::{Config, StorageBackend},
    error::{AppError, AppResult},
};

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Stores the bytes and returns the generated key
    async fn put(&self, content: &[u8], filename: &str) -> AppResult<String>;

    async fn read(&self, key: &str) -> AppResult<Vec<u8>>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Resolves the configured storage backend
pub fn build_file_store(config: &Config) -> Arc<dyn FileStore> {
    match config.storage_backend {
        StorageBackend::Local => Arc::new(LocalFileStore::new(&config.local_storage_path)),
    }
}

#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(AppError::InvalidInput(format!("Invalid storage key: {}", key)));
        }
        Ok(self.root.join(key))
    }
}

/// Keeps only a safe extension from the uploaded filename
fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, content: &[u8], filename: &str) -> AppResult<String> {
        tokio::fs::create_dir_all(&self.root).await?;

        let key = match extension_of(filename) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        tokio::fs::write(self.path_for(&key)?, content).await?;

        tracing::debug!(key = %key, bytes = content.len(), "Stored book content");
        Ok(key)
    }

    async fn read(&self, key: &str) -> AppResult<Vec<u8>> {
        let bytes = tokio::fs::read(self.path_for(key)?).await?;
        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> LocalFileStore {
        LocalFileStore::new(std::env::temp_dir().join(format!("lumina-test-{}", Uuid::new_v4())))
    }

    #[tokio::test]
    async fn test_put_read_delete() {
        let store = temp_store();
        let key = store.put(b"It was a dark night.", "novel.TXT").await.unwrap();
        assert!(key.ends_with(".txt"));

        let bytes = store.read(&key).await.unwrap();
        assert_eq!(bytes, b"It was a dark night.");

        store.delete(&key).await.unwrap();
        assert!(store.read(&key).await.is_err());
        // second delete is a no-op
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let store = temp_store();
        assert!(matches!(
            store.read("../etc/passwd").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.txt"), Some("txt".to_string()));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("weird.t/x"), None);
    }
}
