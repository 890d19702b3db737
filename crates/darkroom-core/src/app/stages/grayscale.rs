//! Grayscale stage. サイズは変えず、envelope も filename 以外はそのまま流す。

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::stages::{blocking, output_name};
use crate::app::worker_loop::{Artifact, Stage, StageOutput};
use crate::domain::{JobEnvelope, PipelineError, StageKind};
use crate::ports::ImageTransform;

pub struct GrayscaleStage {
    transform: Arc<dyn ImageTransform>,
}

impl GrayscaleStage {
    pub fn new(transform: Arc<dyn ImageTransform>) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl Stage for GrayscaleStage {
    fn kind(&self) -> StageKind {
        StageKind::Grayscale
    }

    fn plan(&self, envelope: &JobEnvelope) -> Result<String, PipelineError> {
        Ok(envelope.require_filename()?.to_string())
    }

    async fn apply(
        &self,
        input: Vec<u8>,
        mut envelope: JobEnvelope,
    ) -> Result<StageOutput, PipelineError> {
        let name = output_name(self.kind(), envelope.require_filename()?)?;
        let bytes = blocking(self.transform.clone(), move |t| t.grayscale(&input)).await?;
        envelope.filename = Some(name.clone());

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ImageId;
    use crate::impls::ImageBackend;
    use crate::impls::image_backend::tests::png_bytes;
    use serde_json::json;

    #[tokio::test]
    async fn renames_and_passes_everything_else_through() {
        let mut env = JobEnvelope {
            image_id: Some(ImageId::new("a")),
            filename: Some("resized-image_a.png".into()),
            origin_filename: Some("image_a.png".into()),
            origin_h: Some(100),
            origin_w: Some(200),
            ..JobEnvelope::default()
        };
        env.extra.insert("trace".into(), json!("keep-me"));

        let stage = GrayscaleStage::new(Arc::new(ImageBackend::new()));
        let out = stage.apply(png_bytes(50, 25), env.clone()).await.unwrap();

        assert_eq!(
            out.envelope.filename.as_deref(),
            Some("grayscale-resized-image_a.png")
        );
        let mut expected = env;
        expected.filename = out.envelope.filename.clone();
        assert_eq!(out.envelope, expected);
        assert_eq!(out.artifact.unwrap().name, "grayscale-resized-image_a.png");
    }

    #[test]
    fn plan_only_needs_filename() {
        let stage = GrayscaleStage::new(Arc::new(ImageBackend::new()));
        let env = JobEnvelope {
            filename: Some("x.jpg".into()),
            ..JobEnvelope::default()
        };
        assert_eq!(stage.plan(&env).unwrap(), "x.jpg");
        assert!(stage.plan(&JobEnvelope::default()).is_err());
    }
}
