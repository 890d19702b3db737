//! Resize stage
//!
//! 原画像を `scale_percent` % に縮小し、縮小前のサイズを `origin_h` / `origin_w` に記録する。
//! この 2 つが後で detection 座標を原画像に戻すための唯一の手がかり。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::app::stages::{blocking, output_name};
use crate::app::worker_loop::{Artifact, Stage, StageOutput};
use crate::domain::{JobEnvelope, PipelineError, StageKind};
use crate::ports::ImageTransform;

pub struct ResizeStage {
    transform: Arc<dyn ImageTransform>,
    scale_percent: u32,
}

impl ResizeStage {
    pub fn new(transform: Arc<dyn ImageTransform>, scale_percent: u32) -> Self {
        Self {
            transform,
            scale_percent,
        }
    }
}

#[async_trait]
impl Stage for ResizeStage {
    fn kind(&self) -> StageKind {
        StageKind::Resize
    }

    fn plan(&self, envelope: &JobEnvelope) -> Result<String, PipelineError> {
        envelope.require_image_id()?;
        Ok(envelope.require_filename()?.to_string())
    }

    async fn apply(
        &self,
        input: Vec<u8>,
        mut envelope: JobEnvelope,
    ) -> Result<StageOutput, PipelineError> {
        let source = envelope.require_filename()?.to_string();
        let name = output_name(self.kind(), &source)?;

        let pct = self.scale_percent;
        let resized = blocking(self.transform.clone(), move |t| t.resize(&input, pct)).await?;
        debug!(original = %resized.original, working = %resized.working, "resize done");

        envelope.origin_h = Some(resized.original.height);
        envelope.origin_w = Some(resized.original.width);
        if envelope.origin_filename().is_none() {
            envelope.origin_filename = Some(source);
        }
        envelope.filename = Some(name.clone());

        Ok(StageOutput {
            artifact: Some(Artifact {
                name,
                bytes: resized.bytes,
                content_type: self.transform.output_content_type().to_string(),
            }),
            envelope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dimensions, ImageId};
    use crate::impls::ImageBackend;
    use crate::impls::image_backend::tests::png_bytes;

    fn stage() -> ResizeStage {
        ResizeStage::new(Arc::new(ImageBackend::new()), 25)
    }

    #[tokio::test]
    async fn records_origin_and_renames() {
        let env = JobEnvelope::for_upload(ImageId::new("a"), "image_a.png", Dimensions::new(200, 100));
        let out = stage().apply(png_bytes(200, 100), env).await.unwrap();

        assert_eq!(out.envelope.filename.as_deref(), Some("resized-image_a.png"));
        assert_eq!(out.envelope.origin_h, Some(100));
        assert_eq!(out.envelope.origin_w, Some(200));
        assert_eq!(out.envelope.origin_filename(), Some("image_a.png"));
        assert_eq!(out.envelope.image_id, Some(ImageId::new("a")));

        let artifact = out.artifact.unwrap();
        assert_eq!(artifact.name, "resized-image_a.png");
        assert_eq!(artifact.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn origin_dims_come_from_the_pixels_not_the_envelope() {
        // ingress が書いた値が嘘でも、実画像のサイズで上書きする
        let env = JobEnvelope::for_upload(ImageId::new("a"), "a.png", Dimensions::new(1, 1));
        let out = stage().apply(png_bytes(40, 30), env).await.unwrap();
        assert_eq!(out.envelope.origin_w, Some(40));
        assert_eq!(out.envelope.origin_h, Some(30));
    }

    #[test]
    fn plan_requires_image_id_and_filename() {
        let no_id = JobEnvelope {
            filename: Some("a.png".into()),
            ..JobEnvelope::default()
        };
        assert!(matches!(stage().plan(&no_id), Err(PipelineError::Validation(_))));

        let no_name = JobEnvelope {
            image_id: Some(ImageId::new("a")),
            ..JobEnvelope::default()
        };
        assert!(matches!(stage().plan(&no_name), Err(PipelineError::Validation(_))));
    }

    #[tokio::test]
    async fn undecodable_input_is_a_decode_error() {
        let env = JobEnvelope::for_upload(ImageId::new("a"), "a.png", Dimensions::new(1, 1));
        let err = stage().apply(b"garbage".to_vec(), env).await.unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }
}
