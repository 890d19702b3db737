//! Tag stage（終端）
//!
//! 原画像（`origin_filename`）を読み、detection の box を描いて `tagged-<filename>` に保存する。
//! 出力名は他の stage と同じく入力の `filename` に prefix を積むので、provenance chain が残る。
//! box は原画像の座標で届くので、そのまま描く（はみ出した分は描画時に clamp）。
//!
//! `origin_filename` が無い古い envelope では、`filename` から stage prefix を剥がして原画像名を推定する。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::app::stages::{blocking, output_name};
use crate::app::worker_loop::{Artifact, Stage, StageOutput};
use crate::domain::naming::strip_provenance;
use crate::domain::{JobEnvelope, PipelineError, StageKind};
use crate::ports::ImageTransform;

pub struct TagStage {
    transform: Arc<dyn ImageTransform>,
}

impl TagStage {
    pub fn new(transform: Arc<dyn ImageTransform>) -> Self {
        Self { transform }
    }
}

fn source_name(envelope: &JobEnvelope) -> Result<String, PipelineError> {
    if let Some(origin) = envelope.origin_filename() {
        return Ok(origin.to_string());
    }
    let filename = envelope.require_filename()?;
    let guessed = strip_provenance(filename);
    warn!(%filename, %guessed, "origin_filename missing; recovered from provenance prefixes");
    Ok(guessed.to_string())
}

#[async_trait]
impl Stage for TagStage {
    fn kind(&self) -> StageKind {
        StageKind::Tag
    }

    fn plan(&self, envelope: &JobEnvelope) -> Result<String, PipelineError> {
        envelope.require_filename()?;
        source_name(envelope)
    }

    async fn apply(
        &self,
        input: Vec<u8>,
        envelope: JobEnvelope,
    ) -> Result<StageOutput, PipelineError> {
        let name = output_name(self.kind(), envelope.require_filename()?)?;

        for det in &envelope.detections {
            info!(
                image_id = %envelope.log_id(),
                label = %det.label.name,
                confidence = det.confidence,
                bbox = ?det.bbox,
                "tag"
            );
        }

        let detections = envelope.detections.clone();
        let bytes = blocking(self.transform.clone(), move |t| {
            t.draw_detections(&input, &detections)
        })
        .await?;

        Ok(StageOutput {
            artifact: Some(Artifact {
                name,
                bytes,
                content_type: self.transform.output_content_type().to_string(),
            }),
            envelope,
        })
    }
}
