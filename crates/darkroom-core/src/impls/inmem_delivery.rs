//! InMemoryDeliveryQueue - 単一プロセス用の配送キュー
//!
//! # 学習ポイント
//! - Mutex + Condvar による blocking pop
//! - Async での blocking 処理の扱い（spawn_blocking）
//! - queue 名による複数キューの管理

use crate::ports::{DeliveryQueue, QueueError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// InMemoryDeliveryQueue は `darkroom all` とテスト用の配送キュー
///
/// # 実装詳細
/// - HashMap<String, VecDeque<String>> で queue 名ごとにキューを管理
/// - Mutex で排他制御、Condvar で push 時の通知
/// - pop は取り出した時点で消える（at-most-once）
#[derive(Clone)]
pub struct InMemoryDeliveryQueue {
    queues: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    condvar: Arc<Condvar>,
}

impl InMemoryDeliveryQueue {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Number of records waiting in `queue`.
    pub fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .map(|q| q.get(queue).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }
}

impl Default for InMemoryDeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> QueueError {
    QueueError::OperationFailed("queue lock poisoned".to_string())
}

#[async_trait::async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn push(&self, queue: &str, record: String) -> Result<(), QueueError> {
        let queues = self.queues.clone();
        let condvar = self.condvar.clone();
        let queue = queue.to_string();

        tokio::task::spawn_blocking(move || {
            let mut guard = queues.lock().map_err(|_| poisoned())?;
            guard.entry(queue).or_default().push_back(record);

            // 待っている pop は別の queue 名かもしれないので全員起こす
            condvar.notify_all();
            Ok(())
        })
        .await
        .map_err(|e| QueueError::OperationFailed(format!("Push failed: {}", e)))?
    }

    async fn pop(&self, queue: &str, wait: Duration) -> Result<Option<String>, QueueError> {
        let queues = self.queues.clone();
        let condvar = self.condvar.clone();
        let queue = queue.to_string();

        tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let mut guard = queues.lock().map_err(|_| poisoned())?;
            loop {
                if let Some(q) = guard.get_mut(&queue)
                    && let Some(record) = q.pop_front()
                {
                    return Ok(Some(record));
                }
                let elapsed = start.elapsed();
                if elapsed >= wait {
                    return Ok(None);
                }
                let remaining = wait.saturating_sub(elapsed);
                let (new_guard, _) = condvar
                    .wait_timeout(guard, remaining)
                    .map_err(|_| poisoned())?;
                guard = new_guard;
            }
        })
        .await
        .map_err(|e| QueueError::OperationFailed(format!("Pop failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_push_pop_roundtrip() {
        let queue = InMemoryDeliveryQueue::new();
        queue.push("resize-queue", "a".into()).await.unwrap();
        let popped = queue.pop("resize-queue", Duration::from_secs(1)).await.unwrap();
        assert_eq!(popped.as_deref(), Some("a"));
        assert!(queue.is_empty("resize-queue"));
    }

    #[tokio::test]
    async fn test_pop_is_fifo() {
        let queue = InMemoryDeliveryQueue::new();
        for r in ["1", "2", "3"] {
            queue.push("q", r.into()).await.unwrap();
        }
        let mut out = Vec::new();
        while let Some(r) = queue.pop("q", Duration::ZERO).await.unwrap() {
            out.push(r);
        }
        assert_eq!(out, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_zero_wait_returns_immediately() {
        let queue = InMemoryDeliveryQueue::new();
        let start = Instant::now();
        let popped = queue.pop("q", Duration::ZERO).await.unwrap();
        assert_eq!(popped, None);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_pop_timeout() {
        let queue = InMemoryDeliveryQueue::new();
        let start = Instant::now();
        let popped = queue.pop("q", Duration::from_millis(300)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_multiple_queues() {
        let queue = InMemoryDeliveryQueue::new();
        queue.push("q1", "one".into()).await.unwrap();
        queue.push("q2", "two".into()).await.unwrap();

        let popped2 = queue.pop("q2", Duration::from_secs(1)).await.unwrap();
        let popped1 = queue.pop("q1", Duration::from_secs(1)).await.unwrap();

        assert_eq!(popped1.as_deref(), Some("one"));
        assert_eq!(popped2.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_push_wakes_pop() {
        let queue = Arc::new(InMemoryDeliveryQueue::new());

        let pop_future = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop("q", Duration::from_secs(5)).await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        queue.push("q", "late".into()).await.unwrap();

        let popped = pop_future.await.unwrap();
        assert_eq!(popped.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_push_on_other_queue_does_not_steal_wakeup() {
        let queue = Arc::new(InMemoryDeliveryQueue::new());

        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop("wanted", Duration::from_secs(5)).await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.push("other", "x".into()).await.unwrap();
        queue.push("wanted", "y".into()).await.unwrap();

        assert_eq!(waiter.await.unwrap().as_deref(), Some("y"));
        assert_eq!(queue.len("other"), 1);
    }
}
