//! Object-detect stage
//!
//! detector は working frame（縮小・グレースケール済み画像）の座標で box を返す。
//! ここで原画像の座標に戻してから envelope に載せる。
//!
//! - `confidence > confidence_min` のものだけ残す（等しいものは捨てる）
//! - class index は VOC の 21 ラベルで名前に変換。範囲外は "unknown"
//! - blob は書かない。`filename` は入力のまま下流に渡す

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::app::stages::blocking;
use crate::app::worker_loop::{Stage, StageOutput};
use crate::domain::{Detection, JobEnvelope, Label, PipelineError, StageKind};
use crate::ports::{DetectionFrame, ObjectDetector};
use crate::rescale::Scale;

pub struct ObjectDetectStage {
    detector: Arc<dyn ObjectDetector>,
    confidence_min: f64,
}

impl ObjectDetectStage {
    pub fn new(detector: Arc<dyn ObjectDetector>, confidence_min: f64) -> Self {
        Self {
            detector,
            confidence_min,
        }
    }

    /// Filter, label and rescale one frame's raw boxes into the original frame.
    fn to_origin(&self, frame: DetectionFrame, scale: Scale) -> Vec<Detection> {
        frame
            .detections
            .into_iter()
            .filter(|raw| raw.confidence > self.confidence_min)
            .map(|raw| Detection {
                bbox: scale.apply(raw.bbox),
                label: Label::from_index(raw.class_index),
                confidence: raw.confidence,
            })
            .collect()
    }
}

#[async_trait]
impl Stage for ObjectDetectStage {
    fn kind(&self) -> StageKind {
        StageKind::ObjectDetect
    }

    fn plan(&self, envelope: &JobEnvelope) -> Result<String, PipelineError> {
        envelope.require_origin_dims()?;
        Ok(envelope.require_filename()?.to_string())
    }

    async fn apply(
        &self,
        input: Vec<u8>,
        mut envelope: JobEnvelope,
    ) -> Result<StageOutput, PipelineError> {
        let origin = envelope.require_origin_dims()?;
        let frame = blocking(self.detector.clone(), move |d| d.detect(&input)).await?;
        let raw = frame.detections.len();

        let scale = Scale::between(frame.working, origin)?;
        debug!(working = %frame.working, %origin, sx = scale.x, sy = scale.y, "rescaling detections");

        let detections = self.to_origin(frame, scale);
        for det in &detections {
            debug!(label = %det.label.name, confidence = det.confidence, bbox = ?det.bbox, "detected");
        }
        info!(
            image_id = %envelope.log_id(),
            raw,
            kept = detections.len(),
            "detection finished"
        );

        envelope.detections = detections;
        Ok(StageOutput {
            artifact: None,
            envelope,
        })
    }
}
