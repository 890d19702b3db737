//! Errors - エラー型と分類
//!
//! worker の方針はエラーの「種類」だけで決まる:
//! - Skip: envelope の必須フィールド欠落。warn を出して捨てる
//! - Fatal: decode / transform / store / queue の失敗。error を出してその job だけ失う
//!
//! どちらの場合も worker 自体は止まらず、次の pop に進む。

use thiserror::Error;

use crate::ports::{BlobError, QueueError};

/// ErrorKind は worker がエラーをどう扱うかの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Skip,
    Fatal,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The payload is not a decodable image.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The envelope lacks a field this stage requires, or is not an envelope at all.
    #[error("invalid envelope: {0}")]
    Validation(String),

    /// The external transform collaborator failed.
    #[error("transform failed: {0}")]
    Transform(String),

    #[error(transparent)]
    Store(#[from] BlobError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl PipelineError {
    pub fn missing(field: &str) -> Self {
        PipelineError::Validation(format!("missing required field '{field}'"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Skip,
            PipelineError::Decode(_)
            | PipelineError::Transform(_)
            | PipelineError::Store(_)
            | PipelineError::Queue(_) => ErrorKind::Fatal,
        }
    }
}
