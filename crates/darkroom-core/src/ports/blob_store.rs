//! BlobStore port - 全ステージ共有の blob ストレージ（1 つの bucket）
//!
//! 命名ポリシーは core 側（`domain::naming`）が持つ。ここは名前で読み書きするだけ。
//! 一度書いた名前は不変: 同じ名前への 2 度目の put は `AlreadyExists` になる。

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid blob name: {0}")]
    InvalidName(String),

    #[error("blob store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The remote object store refused or failed the request.
    #[error("blob backend failed: {0}")]
    Backend(String),
}

/// Names are flat: no separators, no parent references.
pub fn validate_name(name: &str) -> Result<(), BlobError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(BlobError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Vec<u8>, BlobError>;

    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError>;
}
