//! DeliveryQueue port - stage ごとの FIFO キュー（Redis または InMemory）
//!
//! # 配送の契約
//! - push は末尾に追加、pop は反対側から取り出す（同一 producer 内で FIFO）
//! - at-most-once / best-effort: pop した時点で job はキューから消える。
//!   ack・lease・visibility timeout は無い。worker が落ちればその job は失われる
//! - pop は `wait` まで待つ long-poll。`wait` が 0 なら即座に返す

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue operation failed: {0}")]
    OperationFailed(String),

    #[error("queue backend unavailable: {0}")]
    Unavailable(String),
}

/// One FIFO list per queue name; records are JSON text.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn push(&self, queue: &str, record: String) -> Result<(), QueueError>;

    /// Remove and return the oldest record, waiting up to `wait` for one to arrive.
    async fn pop(&self, queue: &str, wait: Duration) -> Result<Option<String>, QueueError>;
}
