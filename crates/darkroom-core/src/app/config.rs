//! Pipeline configuration.
//!
//! CLI (clap + env) から組み立てるが、ここ自体は clap に依存しない。
//! ライブラリ利用やテストでは `PipelineConfig::default()` で十分。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::StageKind;

/// Logical queue name per stage input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueNames {
    pub resize: String,
    pub grayscale: String,
    pub object_detect: String,
    pub tag: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            resize: "resize-queue".to_string(),
            grayscale: "grayscale-queue".to_string(),
            object_detect: "objectdetect-queue".to_string(),
            tag: "tag-queue".to_string(),
        }
    }
}

impl QueueNames {
    /// Queue a stage consumes from.
    pub fn input_for(&self, kind: StageKind) -> &str {
        match kind {
            StageKind::Resize => &self.resize,
            StageKind::Grayscale => &self.grayscale,
            StageKind::ObjectDetect => &self.object_detect,
            StageKind::Tag => &self.tag,
        }
    }

    /// Queue a stage forwards to; `None` for the terminal stage.
    pub fn output_for(&self, kind: StageKind) -> Option<&str> {
        match kind {
            StageKind::Resize => Some(&self.grayscale),
            StageKind::Grayscale => Some(&self.object_detect),
            StageKind::ObjectDetect => Some(&self.tag),
            StageKind::Tag => None,
        }
    }

    /// Where the ingress seeds new jobs.
    pub fn entry(&self) -> &str {
        &self.resize
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("scale percent must be within 1..=100, got {0}")]
    ScalePercent(u32),

    #[error("confidence minimum must be within [0, 1], got {0}")]
    ConfidenceMin(f64),

    #[error("queue name for {0} is empty")]
    EmptyQueueName(StageKind),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub queues: QueueNames,
    pub scale_percent: u32,
    /// Detections at or below this confidence are discarded.
    pub confidence_min: f64,
    /// How long one pop waits for work before the worker loops again.
    pub poll_timeout: Duration,
    /// Per-job limit on the transform call. `None` waits indefinitely.
    pub transform_timeout: Option<Duration>,
    pub max_upload_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queues: QueueNames::default(),
            scale_percent: 25,
            confidence_min: 0.4,
            poll_timeout: Duration::from_secs(1),
            transform_timeout: None,
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.scale_percent) {
            return Err(ConfigError::ScalePercent(self.scale_percent));
        }
        if !(0.0..=1.0).contains(&self.confidence_min) {
            return Err(ConfigError::ConfidenceMin(self.confidence_min));
        }
        for kind in StageKind::ALL {
            if self.queues.input_for(kind).is_empty() {
                return Err(ConfigError::EmptyQueueName(kind));
            }
        }
        Ok(())
    }
}
