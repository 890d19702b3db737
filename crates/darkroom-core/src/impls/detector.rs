//! ObjectDetector 実装
//!
//! - **NullDetector**: モデル未設定時のデフォルト。常に 0 件
//! - **ScriptedDetector**: 決まった box を返す（テスト・デモ用）
//!
//! どちらも working frame のサイズを報告するために画像を decode する。
//! decode できない入力は `TransformError::Decode` になる。

use crate::domain::{BoxCorners, Dimensions};
use crate::impls::image_backend::decode;
use crate::ports::{DetectionFrame, ObjectDetector, RawDetection, TransformError};

fn working_dims(bytes: &[u8]) -> Result<Dimensions, TransformError> {
    let img = decode(bytes)?;
    Ok(Dimensions::new(img.width(), img.height()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullDetector;

impl NullDetector {
    pub fn new() -> Self {
        Self
    }
}

impl ObjectDetector for NullDetector {
    fn detect(&self, bytes: &[u8]) -> Result<DetectionFrame, TransformError> {
        Ok(DetectionFrame {
            working: working_dims(bytes)?,
            detections: Vec::new(),
        })
    }
}

/// Returns the same detections, in working-frame pixels, for every image.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDetector {
    detections: Vec<RawDetection>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, bbox: BoxCorners, class_index: usize, confidence: f64) -> Self {
        self.detections.push(RawDetection {
            bbox,
            class_index,
            confidence,
        });
        self
    }
}

impl ObjectDetector for ScriptedDetector {
    fn detect(&self, bytes: &[u8]) -> Result<DetectionFrame, TransformError> {
        Ok(DetectionFrame {
            working: working_dims(bytes)?,
            detections: self.detections.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::image_backend::tests::png_bytes;

    #[test]
    fn null_detector_reports_frame_size_only() {
        let frame = NullDetector::new().detect(&png_bytes(50, 25)).unwrap();
        assert_eq!(frame.working, Dimensions::new(50, 25));
        assert!(frame.detections.is_empty());
    }

    #[test]
    fn scripted_detector_replays_its_boxes() {
        let det = ScriptedDetector::new().with(BoxCorners::new(1, 2, 3, 4), 15, 0.8);
        let frame = det.detect(&png_bytes(10, 10)).unwrap();
        assert_eq!(frame.detections.len(), 1);
        assert_eq!(frame.detections[0].class_index, 15);
    }

    #[test]
    fn undecodable_input_is_a_decode_error() {
        let err = NullDetector::new().detect(b"nope").unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }
}
