//! ImageTransform port - ピクセル処理の外部 collaborator
//!
//! resize の補間、色空間変換、矩形描画などの中身は core の関心外。
//! core はこの trait を 1 回呼ぶだけで、結果のバイト列と寸法だけを見る。
//!
//! 実装は CPU を使う同期処理なので、stage 側から `spawn_blocking` で呼ぶ。

use crate::domain::{Detection, Dimensions, PipelineError};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Input bytes are not an image.
    #[error("{0}")]
    Decode(String),

    /// Decoding worked but the operation itself failed.
    #[error("{0}")]
    Failed(String),
}

impl From<TransformError> for PipelineError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Decode(msg) => PipelineError::Decode(msg),
            TransformError::Failed(msg) => PipelineError::Transform(msg),
        }
    }
}

/// What the ingress learns from decoding an upload once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub dimensions: Dimensions,
    /// File extension for the sniffed format, without the dot.
    pub extension: &'static str,
    pub content_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct Resized {
    pub bytes: Vec<u8>,
    /// Size of the decoded input, before scaling.
    pub original: Dimensions,
    pub working: Dimensions,
}

pub trait ImageTransform: Send + Sync {
    /// Fully decode `bytes` and report its size and format.
    fn inspect(&self, bytes: &[u8]) -> Result<ImageInfo, TransformError>;

    /// Scale both sides to `scale_percent` of the input.
    fn resize(&self, bytes: &[u8], scale_percent: u32) -> Result<Resized, TransformError>;

    /// Grayscale, re-expanded to three channels.
    fn grayscale(&self, bytes: &[u8]) -> Result<Vec<u8>, TransformError>;

    /// Draw one box per detection. Boxes are in the input image's pixel space.
    fn draw_detections(
        &self,
        bytes: &[u8],
        detections: &[Detection],
    ) -> Result<Vec<u8>, TransformError>;

    /// Content type of everything this transform encodes.
    fn output_content_type(&self) -> &'static str {
        "image/jpeg"
    }
}
