//! LocalBlobStore - ローカルディレクトリを bucket として使う blob store
//!
//! `<root>/<bucket>/<name>` に 1 blob = 1 ファイルで保存する。
//! 書き込みは bucket 内の一時ファイルに書いてから `persist_noclobber` で名前を付ける。
//! 既存の名前には書けない（blob は不変）し、書き込みに失敗しても途中までのファイルは見えない。
//! ファイルシステムには content type を保存する場所がないので、ログに残すだけ。

use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::ports::{BlobError, BlobStore, validate_name};

pub struct LocalBlobStore {
    bucket_dir: PathBuf,
}

impl LocalBlobStore {
    /// Open `<root>/<bucket>`, creating the bucket if it does not exist yet.
    pub async fn open(root: impl AsRef<Path>, bucket: &str) -> Result<Self, BlobError> {
        validate_name(bucket)?;
        let bucket_dir = root.as_ref().join(bucket);
        if fs::try_exists(&bucket_dir).await? {
            info!(bucket, path = %bucket_dir.display(), "using existing bucket");
        } else {
            fs::create_dir_all(&bucket_dir).await?;
            info!(bucket, path = %bucket_dir.display(), "created bucket");
        }
        Ok(Self { bucket_dir })
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, BlobError> {
        validate_name(name)?;
        Ok(self.bucket_dir.join(name))
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_of(name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        let path = self.path_of(name)?;
        let dir = self.bucket_dir.clone();
        let size = bytes.len();
        tokio::task::spawn_blocking(move || {
            write_atomically(&dir, &path, |file| file.write_all(&bytes))
        })
        .await
        .map_err(|e| io::Error::other(format!("blob write task aborted: {e}")))?
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => BlobError::AlreadyExists(name.to_string()),
            _ => BlobError::Io(e),
        })?;
        debug!(name, content_type, size, "blob stored");
        Ok(())
    }
}

/// Fill a temp file in `dir`, then link it to `target` only if `target` is free.
/// On any error the temp file is removed and `target` is untouched.
fn write_atomically<F>(dir: &Path, target: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(dir)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(target).map_err(|e| e.error)?;
    Ok(())
}
