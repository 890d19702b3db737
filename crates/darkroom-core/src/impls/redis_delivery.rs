//! RedisDeliveryQueue - プロセスをまたぐ本番用の配送キュー
//!
//! - push: `LPUSH queue record`
//! - pop:  `BRPOP queue wait`（wait が 0 のときは `RPOP`。BRPOP 0 は無期限待ちになるため）
//!
//! LPUSH と RPOP を反対側の端で使うので、同じ producer からの record は FIFO で届く。
//! BRPOP は接続をブロックするので、worker ごとに別の接続（別インスタンス）を持つこと。

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use tracing::info;

use crate::ports::{DeliveryQueue, QueueError};

pub struct RedisDeliveryQueue {
    conn: MultiplexedConnection,
}

impl RedisDeliveryQueue {
    /// Open one connection to `redis://host:port/` and verify it with PING.
    pub async fn connect(host: &str, port: u16) -> Result<Self, QueueError> {
        Self::connect_url(&format!("redis://{host}:{port}/")).await
    }

    pub async fn connect_url(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        info!(url, reply = %pong, "redis connected");

        Ok(Self { conn })
    }
}

fn unavailable(e: redis::RedisError) -> QueueError {
    QueueError::Unavailable(e.to_string())
}

fn failed(e: redis::RedisError) -> QueueError {
    QueueError::OperationFailed(e.to_string())
}

#[async_trait::async_trait]
impl DeliveryQueue for RedisDeliveryQueue {
    async fn push(&self, queue: &str, record: String) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _len: i64 = redis::cmd("LPUSH")
            .arg(queue)
            .arg(record)
            .query_async(&mut conn)
            .await
            .map_err(failed)?;
        Ok(())
    }

    async fn pop(&self, queue: &str, wait: Duration) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        if wait.is_zero() {
            let record: Option<String> = redis::cmd("RPOP")
                .arg(queue)
                .query_async(&mut conn)
                .await
                .map_err(failed)?;
            return Ok(record);
        }

        // BRPOP は [key, value] を返す。小数秒は Redis 6 以降で有効
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue)
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(failed)?;
        Ok(reply.map(|(_, record)| record))
    }
}
