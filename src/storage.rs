use async_trait::async_trait;
use log::{error, info};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed storage for official document files, keyed by SHA-256 hex.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save(&self, hash: &str, bytes: &[u8]) -> Result<(), DocumentStoreError>;
    async fn load(&self, hash: &str) -> Result<Vec<u8>, DocumentStoreError>;
    async fn delete(&self, hash: &str) -> Result<(), DocumentStoreError>;
}

pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: PathBuf) -> Self {
        info!("document store rooted at '{}'", root.display());
        Self { root }
    }

    fn path_for(&self, hash: &str) -> Result<PathBuf, DocumentStoreError> {
        if hash.len() < 2 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DocumentStoreError::NotFound);
        }
        Ok(self.root.join(&hash[0..2]).join(hash))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn save(&self, hash: &str, bytes: &[u8]) -> Result<(), DocumentStoreError> {
        let path = self.path_for(hash)?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(DocumentStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| DocumentStoreError::Other(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("write failed hash={hash} path={}: {e}", path.display());
            DocumentStoreError::Other(e.to_string())
        })
    }

    async fn load(&self, hash: &str) -> Result<Vec<u8>, DocumentStoreError> {
        let path = self.path_for(hash)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DocumentStoreError::NotFound),
            Err(e) => Err(DocumentStoreError::Other(e.to_string())),
        }
    }

    async fn delete(&self, hash: &str) -> Result<(), DocumentStoreError> {
        let path = self.path_for(hash)?;
        // missing files count as deleted
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(DocumentStoreError::Other(e.to_string())),
            _ => Ok(()),
        }
    }
}
