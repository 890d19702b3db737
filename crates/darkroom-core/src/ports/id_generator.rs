//! IdGenerator port - ID 生成の抽象化
//!
//! ingress が upload ごとに `ImageId` を 1 つ採番する。
//! テスト容易性のために trait にしてある。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ImageId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は衝突しない ImageId を生成
///
/// # ULID の特性
/// - 時刻でソート可能
/// - 分散環境で生成可能（ingress を複数並べても調整不要）
pub trait IdGenerator: Send + Sync {
    fn generate_image_id(&self) -> ImageId;
}

/// UlidGenerator は Clock の現在時刻を timestamp 部分に使う
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_image_id(&self) -> ImageId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        ImageId::from(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_image_id();
        let id2 = id_gen.generate_image_id();
        let id3 = id_gen.generate_image_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_image_id();
        let id2 = id_gen.generate_image_id();

        // ランダム部分があるので ID は異なる
        assert_ne!(id1, id2);

        // timestamp 部分は同じ
        let ts1 = Ulid::from_string(&id1.as_str().to_uppercase()).unwrap().timestamp_ms();
        let ts2 = Ulid::from_string(&id2.as_str().to_uppercase()).unwrap().timestamp_ms();
        assert_eq!(ts1, ts2);
        assert_eq!(ts1, fixed_time.timestamp_millis() as u64);
    }
}
