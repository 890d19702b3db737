//! WorkerLoop - stage 共通の実行ループ
//!
//! # フロー（1 周 = 1 job）
//! 1. DeliveryQueue::pop() で record を 1 件取得（なければ IDLE）
//! 2. JobEnvelope に parse、Stage::plan() で必須フィールドを検証
//! 3. BlobStore::get() で入力 blob を取得
//! 4. Stage::apply() で変換 → 出力 blob と新しい envelope
//! 5. BlobStore::put() で出力を保存
//! 6. 下流キューへ push（終端 stage は push しない）
//!
//! # 失敗時
//! - 必須フィールド欠落: warn を出して DROPPED
//! - それ以外: error を出して FAILED。requeue も retry も dead-letter もしない
//!
//! どちらでも worker は止まらず次の pop に進む。1 worker が同時に持つ job は常に 1 件。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app::config::PipelineConfig;
use crate::domain::{ErrorKind, JobEnvelope, PipelineError, StageKind};
use crate::ports::{BlobStore, DeliveryQueue};

/// A blob a stage wants written.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct StageOutput {
    pub artifact: Option<Artifact>,
    pub envelope: JobEnvelope,
}

/// One pipeline stage: a transform plus its envelope field rules.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Validate the fields this stage needs and name the blob it reads.
    fn plan(&self, envelope: &JobEnvelope) -> Result<String, PipelineError>;

    async fn apply(
        &self,
        input: Vec<u8>,
        envelope: JobEnvelope,
    ) -> Result<StageOutput, PipelineError>;
}

/// Where one iteration of the loop ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopOutcome {
    /// No job was available.
    Idle,
    /// Job done and pushed downstream.
    Forwarded,
    /// Job done at the terminal stage.
    Finished,
    /// Envelope lacked required fields; discarded without side effects.
    Dropped,
    /// Fetch, transform or store failed; the job is lost.
    Failed,
}

pub struct StageWorker {
    stage: Arc<dyn Stage>,
    input: String,
    output: Option<String>,
    queue: Arc<dyn DeliveryQueue>,
    blobs: Arc<dyn BlobStore>,
    poll_timeout: Duration,
    transform_timeout: Option<Duration>,
}

impl StageWorker {
    pub fn new(
        stage: Arc<dyn Stage>,
        queue: Arc<dyn DeliveryQueue>,
        blobs: Arc<dyn BlobStore>,
        config: &PipelineConfig,
    ) -> Self {
        let kind = stage.kind();
        Self {
            input: config.queues.input_for(kind).to_string(),
            output: config.queues.output_for(kind).map(str::to_string),
            stage,
            queue,
            blobs,
            poll_timeout: config.poll_timeout,
            transform_timeout: config.transform_timeout,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.stage.kind()
    }

    pub fn input_queue(&self) -> &str {
        &self.input
    }

    pub fn output_queue(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Run until `shutdown` turns true.
    ///
    /// pop は poll_timeout で必ず返るので、shutdown は次の周回の頭で見る。
    /// 処理中の job は最後まで終わらせてから抜ける。
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let stage = self.kind();
        info!(%stage, queue = %self.input, "stage worker started");
        while !*shutdown.borrow() {
            let outcome = self.run_once().await;
            debug!(%stage, ?outcome, "hop finished");
        }
        info!(%stage, "stage worker stopped");
    }

    /// Poll once and process at most one job.
    pub async fn run_once(&self) -> HopOutcome {
        match self.poll().await {
            Some(record) => self.handle(&record).await,
            None => HopOutcome::Idle,
        }
    }

    async fn poll(&self) -> Option<String> {
        match self.queue.pop(&self.input, self.poll_timeout).await {
            Ok(record) => record,
            Err(e) => {
                error!(stage = %self.kind(), queue = %self.input, error = %e, "pop failed");
                // broker が落ちている間に空回りしない
                tokio::time::sleep(self.poll_timeout).await;
                None
            }
        }
    }

    /// Process one popped record. Never propagates an error.
    pub async fn handle(&self, record: &str) -> HopOutcome {
        let stage = self.kind();
        debug!(%stage, %record, "received job");

        match self.process(record).await {
            Ok(outcome) => outcome,
            Err(err) => match err.kind() {
                ErrorKind::Skip => {
                    warn!(%stage, error = %err, %record, "skipping job");
                    HopOutcome::Dropped
                }
                ErrorKind::Fatal => {
                    error!(%stage, error = %err, details = ?err, %record, "job failed and was dropped");
                    HopOutcome::Failed
                }
            },
        }
    }

    async fn process(&self, record: &str) -> Result<HopOutcome, PipelineError> {
        let stage = self.kind();
        let envelope = JobEnvelope::from_record(record)?;
        let input = self.stage.plan(&envelope)?;
        let image_id = envelope.log_id().to_string();

        info!(%stage, %image_id, filename = %input, "processing");
        let bytes = self.blobs.get(&input).await?;

        let output = match self.transform_timeout {
            // spawn_blocking 側の計算は止まらないが、worker は次の job に進む
            Some(limit) => tokio::time::timeout(limit, self.stage.apply(bytes, envelope))
                .await
                .map_err(|_| PipelineError::Transform(format!("timed out after {limit:?}")))??,
            None => self.stage.apply(bytes, envelope).await?,
        };

        if let Some(artifact) = output.artifact {
            let size = artifact.bytes.len();
            self.blobs
                .put(&artifact.name, artifact.bytes, &artifact.content_type)
                .await?;
            info!(%stage, %image_id, name = %artifact.name, size, "saved artifact");
        }

        match &self.output {
            Some(next) => {
                let record = output.envelope.to_record()?;
                self.queue.push(next, record).await?;
                info!(
                    %stage,
                    %image_id,
                    queue = %next,
                    detections = output.envelope.detections.len(),
                    "forwarded"
                );
                Ok(HopOutcome::Forwarded)
            }
            None => {
                info!(%stage, %image_id, "finished");
                Ok(HopOutcome::Finished)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ImageId;
    use crate::impls::{InMemoryBlobStore, InMemoryDeliveryQueue};

    /// Uppercases the blob; fails on blobs that start with "boom".
    struct ShoutStage;

    #[async_trait]
    impl Stage for ShoutStage {
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
            if input.starts_with(b"boom") {
                return Err(PipelineError::Transform("boom".into()));
            }
            let name = format!("grayscale-{}", envelope.require_filename()?);
            envelope.filename = Some(name.clone());
            Ok(StageOutput {
                artifact: Some(Artifact {
                    name,
                    bytes: input.to_ascii_uppercase(),
                    content_type: "text/plain".into(),
                }),
                envelope,
            })
        }
    }

    struct SlowStage;

    #[async_trait]
    impl Stage for SlowStage {
        fn kind(&self) -> StageKind {
            StageKind::Tag
        }

        fn plan(&self, envelope: &JobEnvelope) -> Result<String, PipelineError> {
            Ok(envelope.require_filename()?.to_string())
        }

        async fn apply(
            &self,
            _input: Vec<u8>,
            envelope: JobEnvelope,
        ) -> Result<StageOutput, PipelineError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(StageOutput {
                artifact: None,
                envelope,
            })
        }
    }

    struct Fixture {
        queue: Arc<InMemoryDeliveryQueue>,
        blobs: Arc<InMemoryBlobStore>,
        config: PipelineConfig,
    }

    fn fixture() -> Fixture {
        Fixture {
            queue: Arc::new(InMemoryDeliveryQueue::new()),
            blobs: Arc::new(InMemoryBlobStore::new()),
            config: PipelineConfig {
                poll_timeout: Duration::from_millis(50),
                ..PipelineConfig::default()
            },
        }
    }

    impl Fixture {
        fn worker(&self, stage: Arc<dyn Stage>) -> StageWorker {
            StageWorker::new(stage, self.queue.clone(), self.blobs.clone(), &self.config)
        }

        async fn seed(&self, name: &str, body: &[u8]) -> String {
            self.blobs.put(name, body.to_vec(), "text/plain").await.unwrap();
            JobEnvelope {
                image_id: Some(ImageId::new("id-1")),
                filename: Some(name.to_string()),
                ..JobEnvelope::default()
            }
            .to_record()
            .unwrap()
        }
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let f = fixture();
        let worker = f.worker(Arc::new(ShoutStage));
        assert_eq!(worker.run_once().await, HopOutcome::Idle);
    }

    #[tokio::test]
    async fn success_stores_artifact_and_forwards() {
        let f = fixture();
        let worker = f.worker(Arc::new(ShoutStage));
        let record = f.seed("a.txt", b"hello").await;
        f.queue.push("grayscale-queue", record).await.unwrap();

        assert_eq!(worker.run_once().await, HopOutcome::Forwarded);
        assert_eq!(f.blobs.get("grayscale-a.txt").await.unwrap(), b"HELLO".to_vec());

        let next = f.queue.pop("objectdetect-queue", Duration::ZERO).await.unwrap().unwrap();
        let env = JobEnvelope::from_record(&next).unwrap();
        assert_eq!(env.filename.as_deref(), Some("grayscale-a.txt"));
        assert_eq!(env.image_id, Some(ImageId::new("id-1")));
    }

    #[tokio::test]
    async fn missing_filename_is_dropped_without_forwarding() {
        let f = fixture();
        let worker = f.worker(Arc::new(ShoutStage));
        f.queue
            .push("grayscale-queue", r#"{"image_id":"x"}"#.into())
            .await
            .unwrap();

        assert_eq!(worker.run_once().await, HopOutcome::Dropped);
        assert!(f.queue.is_empty("objectdetect-queue"));
        assert!(f.blobs.names().await.is_empty());

        // loop keeps going
        assert_eq!(worker.run_once().await, HopOutcome::Idle);
    }

    #[tokio::test]
    async fn garbage_record_is_dropped() {
        let f = fixture();
        let worker = f.worker(Arc::new(ShoutStage));
        f.queue.push("grayscale-queue", "{{{".into()).await.unwrap();
        assert_eq!(worker.run_once().await, HopOutcome::Dropped);
    }

    #[tokio::test]
    async fn failure_does_not_block_the_next_job() {
        let f = fixture();
        let worker = f.worker(Arc::new(ShoutStage));
        let bad = f.seed("bad.txt", b"boom").await;
        let good = f.seed("good.txt", b"ok").await;
        f.queue.push("grayscale-queue", bad).await.unwrap();
        f.queue.push("grayscale-queue", good).await.unwrap();

        assert_eq!(worker.run_once().await, HopOutcome::Failed);
        assert_eq!(worker.run_once().await, HopOutcome::Forwarded);

        // the failed job is gone for good
        assert_eq!(f.queue.len("objectdetect-queue"), 1);
        assert!(f.queue.is_empty("grayscale-queue"));
        assert!(!f.blobs.contains("grayscale-bad.txt").await);
    }

    #[tokio::test]
    async fn missing_input_blob_fails_the_job() {
        let f = fixture();
        let worker = f.worker(Arc::new(ShoutStage));
        f.queue
            .push("grayscale-queue", r#"{"filename":"ghost.txt"}"#.into())
            .await
            .unwrap();
        assert_eq!(worker.run_once().await, HopOutcome::Failed);
    }

    #[tokio::test]
    async fn existing_output_name_fails_instead_of_overwriting() {
        let f = fixture();
        let worker = f.worker(Arc::new(ShoutStage));
        let record = f.seed("a.txt", b"new").await;
        f.blobs
            .put("grayscale-a.txt", b"OLD".to_vec(), "text/plain")
            .await
            .unwrap();
        f.queue.push("grayscale-queue", record).await.unwrap();

        assert_eq!(worker.run_once().await, HopOutcome::Failed);
        assert_eq!(f.blobs.get("grayscale-a.txt").await.unwrap(), b"OLD".to_vec());
        assert!(f.queue.is_empty("objectdetect-queue"));
    }

    #[tokio::test]
    async fn terminal_stage_finishes_without_push() {
        let mut f = fixture();
        f.config.transform_timeout = None;
        let record = f.seed("a.txt", b"x").await;
        f.queue.push("tag-queue", record).await.unwrap();

        struct Terminal;
        #[async_trait]
        impl Stage for Terminal {
            fn kind(&self) -> StageKind {
                StageKind::Tag
            }
            fn plan(&self, envelope: &JobEnvelope) -> Result<String, PipelineError> {
                Ok(envelope.require_filename()?.to_string())
            }
            async fn apply(
                &self,
                _input: Vec<u8>,
                envelope: JobEnvelope,
            ) -> Result<StageOutput, PipelineError> {
                Ok(StageOutput {
                    artifact: None,
                    envelope,
                })
            }
        }

        let worker = f.worker(Arc::new(Terminal));
        assert_eq!(worker.output_queue(), None);
        assert_eq!(worker.run_once().await, HopOutcome::Finished);
    }

    #[tokio::test]
    async fn transform_timeout_fails_the_job() {
        let mut f = fixture();
        f.config.transform_timeout = Some(Duration::from_millis(50));
        let record = f.seed("slow.txt", b"x").await;
        f.queue.push("tag-queue", record).await.unwrap();

        let worker = f.worker(Arc::new(SlowStage));
        assert_eq!(worker.run_once().await, HopOutcome::Failed);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let f = fixture();
        let worker = f.worker(Arc::new(ShoutStage));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
