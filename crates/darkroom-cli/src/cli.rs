use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use darkroom_core::app::{PipelineConfig, QueueNames};
use darkroom_core::domain::StageKind;
use darkroom_core::impls::S3Settings;

#[derive(Parser, Debug)]
#[command(author, version, about = "Queue-driven image pipeline", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Where jobs travel between stages
    #[arg(long, value_enum, env = "DARKROOM_QUEUE_BACKEND", default_value = "memory")]
    pub queue_backend: QueueBackend,

    #[arg(long, env = "REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    #[arg(long, env = "REDIS_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    /// Where image bytes are kept
    #[arg(long, value_enum, env = "BLOB_BACKEND", default_value = "local")]
    pub blob_backend: BlobBackend,

    /// Root directory for the local blob store
    #[arg(long, env = "STORE_ROOT", default_value = "./data")]
    pub store_root: PathBuf,

    /// Bucket holding every artifact (a sub-directory for the local store)
    #[arg(long, env = "BUCKET_NAME", default_value = "images")]
    pub bucket: String,

    /// S3-compatible endpoint, `host:port` or a URL
    #[arg(long, env = "MINIO_ENDPOINT", default_value = "127.0.0.1:9000")]
    pub minio_endpoint: String,

    #[arg(long, env = "MINIO_ACCESS_KEY", default_value = "minioadmin", hide_env_values = true)]
    pub minio_access_key: String,

    #[arg(long, env = "MINIO_SECRET_KEY", default_value = "minioadmin", hide_env_values = true)]
    pub minio_secret_key: String,

    /// Use https for an endpoint given without a scheme
    #[arg(long, env = "MINIO_SECURE")]
    pub minio_secure: bool,

    /// ONNX MobileNet-SSD model for object-detect; without it no objects are reported
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    #[arg(long, env = "RESIZE_QUEUE", default_value = "resize-queue")]
    pub resize_queue: String,

    #[arg(long, env = "GRAYSCALE_QUEUE", default_value = "grayscale-queue")]
    pub grayscale_queue: String,

    #[arg(long, env = "OBJECTDETECT_QUEUE", default_value = "objectdetect-queue")]
    pub objectdetect_queue: String,

    #[arg(long, env = "TAG_QUEUE", default_value = "tag-queue")]
    pub tag_queue: String,

    /// Resize target as a percentage of the original size
    #[arg(long, env = "SCALE_PERCENT", default_value_t = 25)]
    pub scale_percent: u32,

    /// Detections at or below this confidence are discarded
    #[arg(long, env = "CONFIDENCE_MIN", default_value_t = 0.4)]
    pub confidence_min: f64,

    /// How long one queue poll waits for work
    #[arg(long, env = "POLL_TIMEOUT_MS", default_value_t = 1000)]
    pub poll_timeout_ms: u64,

    /// Per-job transform limit; unset waits indefinitely
    #[arg(long, env = "TRANSFORM_TIMEOUT_SECS")]
    pub transform_timeout_secs: Option<u64>,

    /// Host the ingress binds to
    #[arg(long, env = "DARKROOM_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port the ingress binds to
    #[arg(long, env = "DARKROOM_PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 32 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP ingress only
    Ingress,
    /// Run the worker loop of one stage
    Worker {
        /// resize | grayscale | object-detect | tag
        stage: StageKind,
    },
    /// Run the ingress and every stage in one process
    All,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// In-process queue; only useful with `all`
    Memory,
    Redis,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    /// Files under `--store-root`
    Local,
    /// S3-compatible object store such as MinIO
    S3,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queues: QueueNames {
                resize: self.resize_queue.clone(),
                grayscale: self.grayscale_queue.clone(),
                object_detect: self.objectdetect_queue.clone(),
                tag: self.tag_queue.clone(),
            },
            scale_percent: self.scale_percent,
            confidence_min: self.confidence_min,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            transform_timeout: self.transform_timeout_secs.map(Duration::from_secs),
            max_upload_bytes: self.max_upload_bytes,
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            endpoint: self.minio_endpoint.clone(),
            access_key: self.minio_access_key.clone(),
            secret_key: self.minio_secret_key.clone(),
            secure: self.minio_secure,
        }
    }

    /// Stages this process runs workers for.
    pub fn stages(&self) -> Vec<StageKind> {
        match &self.command {
            Command::Ingress => Vec::new(),
            Command::Worker { stage } => vec![*stage],
            Command::All => StageKind::ALL.to_vec(),
        }
    }

    pub fn serves_ingress(&self) -> bool {
        matches!(self.command, Command::Ingress | Command::All)
    }
}
