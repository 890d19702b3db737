//! PipelineBuilder - pipeline の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 必須の collaborator（queue / blob store / image transform）が欠けていれば
//!   build() 時に BuildError を返す。欠けているものは全部まとめて報告する
//! - PipelineConfig::validate() もここで通す
//! - 起動してから最初の job で落ちる、ということが無いようにする
//!
//! # 使用例
//! ```ignore
//! let pipeline = PipelineBuilder::new()
//!     .queue(Arc::new(InMemoryDeliveryQueue::new()))
//!     .blobs(Arc::new(InMemoryBlobStore::new()))
//!     .transform(Arc::new(ImageBackend::new()))
//!     .build()?;
//! let workers = pipeline.workers(&StageKind::ALL);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::app::config::{ConfigError, PipelineConfig};
use crate::app::ingress::{self, IngressState};
use crate::app::stages::{GrayscaleStage, ObjectDetectStage, ResizeStage, TagStage};
use crate::app::worker_loop::{Stage, StageWorker};
use crate::domain::StageKind;
use crate::impls::NullDetector;
use crate::ports::{
    BlobStore, DeliveryQueue, IdGenerator, ImageTransform, ObjectDetector, SystemClock,
    UlidGenerator,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing collaborators: {0:?}. These must be set before build().")]
    Missing(Vec<&'static str>),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    queue: Option<Arc<dyn DeliveryQueue>>,
    stage_queues: HashMap<StageKind, Arc<dyn DeliveryQueue>>,
    blobs: Option<Arc<dyn BlobStore>>,
    transform: Option<Arc<dyn ImageTransform>>,
    detector: Option<Arc<dyn ObjectDetector>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            queue: None,
            stage_queues: HashMap::new(),
            blobs: None,
            transform: None,
            detector: None,
            ids: None,
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Queue used by the ingress and by every stage without an override.
    pub fn queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Dedicated queue connection for one stage's worker.
    ///
    /// Redis の BRPOP は接続を塞ぐので、同一プロセスで複数 stage を回すときは
    /// stage ごとに別接続を渡す。
    pub fn stage_queue(mut self, kind: StageKind, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.stage_queues.insert(kind, queue);
        self
    }

    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn transform(mut self, transform: Arc<dyn ImageTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Optional. Without one, object-detect reports no objects.
    pub fn detector(mut self, detector: Arc<dyn ObjectDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Optional. Defaults to ULIDs from the system clock.
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<Pipeline, BuildError> {
        let mut missing = Vec::new();
        if self.queue.is_none() {
            missing.push("queue");
        }
        if self.blobs.is_none() {
            missing.push("blobs");
        }
        if self.transform.is_none() {
            missing.push("transform");
        }
        let (Some(queue), Some(blobs), Some(transform)) = (self.queue, self.blobs, self.transform)
        else {
            return Err(BuildError::Missing(missing));
        };

        self.config.validate()?;

        let detector: Arc<dyn ObjectDetector> = match self.detector {
            Some(detector) => detector,
            None => {
                warn!("no detection model configured; object-detect will report no objects");
                Arc::new(NullDetector::new())
            }
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(SystemClock)),
        };

        Ok(Pipeline {
            config: self.config,
            queue,
            stage_queues: self.stage_queues,
            blobs,
            transform,
            detector,
            ids,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wired collaborators. Hands out stage workers and the ingress router.
pub struct Pipeline {
    config: PipelineConfig,
    queue: Arc<dyn DeliveryQueue>,
    stage_queues: HashMap<StageKind, Arc<dyn DeliveryQueue>>,
    blobs: Arc<dyn BlobStore>,
    transform: Arc<dyn ImageTransform>,
    detector: Arc<dyn ObjectDetector>,
    ids: Arc<dyn IdGenerator>,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage(&self, kind: StageKind) -> Arc<dyn Stage> {
        match kind {
            StageKind::Resize => Arc::new(ResizeStage::new(
                self.transform.clone(),
                self.config.scale_percent,
            )),
            StageKind::Grayscale => Arc::new(GrayscaleStage::new(self.transform.clone())),
            StageKind::ObjectDetect => Arc::new(ObjectDetectStage::new(
                self.detector.clone(),
                self.config.confidence_min,
            )),
            StageKind::Tag => Arc::new(TagStage::new(self.transform.clone())),
        }
    }

    pub fn worker(&self, kind: StageKind) -> StageWorker {
        let queue = self
            .stage_queues
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.queue.clone());
        StageWorker::new(self.stage(kind), queue, self.blobs.clone(), &self.config)
    }

    pub fn workers(&self, kinds: &[StageKind]) -> Vec<StageWorker> {
        kinds.iter().map(|&kind| self.worker(kind)).collect()
    }

    pub fn ingress_state(&self) -> IngressState {
        IngressState {
            queue: self.queue.clone(),
            blobs: self.blobs.clone(),
            transform: self.transform.clone(),
            ids: self.ids.clone(),
            entry_queue: self.config.queues.entry().to_string(),
        }
    }

    /// `POST /grab` router seeded into this pipeline's entry queue.
    pub fn ingress(&self) -> axum::Router {
        ingress::router(Arc::new(self.ingress_state()), self.config.max_upload_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{ImageBackend, InMemoryBlobStore, InMemoryDeliveryQueue};

    fn complete() -> PipelineBuilder {
        PipelineBuilder::new()
            .queue(Arc::new(InMemoryDeliveryQueue::new()))
            .blobs(Arc::new(InMemoryBlobStore::new()))
            .transform(Arc::new(ImageBackend::new()))
    }

    #[test]
    fn test_build_success() {
        let pipeline = complete().build().unwrap();
        assert_eq!(pipeline.config().scale_percent, 25);
    }

    #[test]
    fn test_build_reports_every_missing_collaborator() {
        let result = PipelineBuilder::new()
            .queue(Arc::new(InMemoryDeliveryQueue::new()))
            .build();
        assert!(matches!(
            result,
            Err(BuildError::Missing(missing)) if missing == vec!["blobs", "transform"]
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = PipelineConfig {
            scale_percent: 0,
            ..PipelineConfig::default()
        };
        let result = complete().config(config).build();
        assert!(matches!(
            result,
            Err(BuildError::Config(ConfigError::ScalePercent(0)))
        ));
    }

    #[test]
    fn test_workers_are_wired_in_pipeline_order() {
        let pipeline = complete().build().unwrap();
        let workers = pipeline.workers(&StageKind::ALL);
        let routes: Vec<_> = workers
            .iter()
            .map(|w| (w.kind(), w.input_queue(), w.output_queue()))
            .collect();
        assert_eq!(
            routes,
            vec![
                (StageKind::Resize, "resize-queue", Some("grayscale-queue")),
                (StageKind::Grayscale, "grayscale-queue", Some("objectdetect-queue")),
                (StageKind::ObjectDetect, "objectdetect-queue", Some("tag-queue")),
                (StageKind::Tag, "tag-queue", None),
            ]
        );
    }

    #[test]
    fn test_stage_kinds_match() {
        let pipeline = complete().build().unwrap();
        for kind in StageKind::ALL {
            assert_eq!(pipeline.stage(kind).kind(), kind);
        }
    }

    #[test]
    fn test_ingress_targets_entry_queue() {
        let pipeline = complete().build().unwrap();
        assert_eq!(pipeline.ingress_state().entry_queue, "resize-queue");
    }
}
