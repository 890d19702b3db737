//! ObjectDetector port - ニューラルネット推論の外部 collaborator
//!
//! detector は自分が見た画像（working frame）のピクセル座標で box を返す。
//! 元画像の座標への変換は core の `rescale` が行う。

use crate::domain::{BoxCorners, Dimensions};
use crate::ports::TransformError;

/// A box as the model reported it, before label lookup and rescaling.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: BoxCorners,
    pub class_index: usize,
    pub confidence: f64,
}

/// Detections plus the size of the frame they were computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFrame {
    pub working: Dimensions,
    pub detections: Vec<RawDetection>,
}

pub trait ObjectDetector: Send + Sync {
    fn detect(&self, bytes: &[u8]) -> Result<DetectionFrame, TransformError>;
}
