use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::StageWorker;

/// Worker group handle.
/// - `request_shutdown()` で全 worker に停止を伝える
/// - `shutdown_and_join()` で全 worker の終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn one task per stage worker.
    pub fn spawn(workers: Vec<StageWorker>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(workers.len());
        for worker in workers {
            let rx = shutdown_rx.clone();
            let join = tokio::spawn(async move {
                worker.run(rx).await;
            });
            joins.push(join);
        }
        info!(workers = joins.len(), "worker group started");

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// In-flight jobs are not cancelled; each worker finishes its current
    /// job and stops before the next pop.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(e) = j.await {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("worker group stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::PipelineBuilder;
    use crate::domain::StageKind;
    use crate::impls::{ImageBackend, InMemoryBlobStore, InMemoryDeliveryQueue};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_stops_every_worker() {
        let mut config = crate::app::PipelineConfig::default();
        config.poll_timeout = Duration::from_millis(20);
        let pipeline = PipelineBuilder::new()
            .config(config)
            .queue(Arc::new(InMemoryDeliveryQueue::new()))
            .blobs(Arc::new(InMemoryBlobStore::new()))
            .transform(Arc::new(ImageBackend::new()))
            .build()
            .unwrap();

        let group = WorkerGroup::spawn(pipeline.workers(&StageKind::ALL));
        assert_eq!(group.len(), 4);

        tokio::time::timeout(Duration::from_secs(2), group.shutdown_and_join())
            .await
            .expect("workers did not stop");
    }
}
