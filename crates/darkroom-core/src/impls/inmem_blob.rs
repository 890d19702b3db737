//! InMemoryBlobStore - テスト・単一プロセス用の blob store

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::ports::{BlobError, BlobStore};

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, StoredBlob>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.blobs.lock().await.contains_key(name)
    }

    pub async fn content_type(&self, name: &str) -> Option<String> {
        self.blobs
            .lock()
            .await
            .get(name)
            .map(|b| b.content_type.clone())
    }

    /// Stored names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait::async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .lock()
            .await
            .get(name)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| BlobError::NotFound(name.to_string()))
    }

    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        if name.is_empty() {
            return Err(BlobError::InvalidName(name.to_string()));
        }
        let mut blobs = self.blobs.lock().await;
        if blobs.contains_key(name) {
            return Err(BlobError::AlreadyExists(name.to_string()));
        }
        blobs.insert(
            name.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}
