//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（Redis, blob storage, 画像処理, 推論）への
//! インターフェースを提供し、実装の詳細を隠蔽する。
//!
//! # 設計原則
//! - キューには JSON の envelope だけを流す（画像本体は blob store）
//! - blob 名は core の命名ポリシーで決まる
//! - 画像処理の中身は ImageTransform / ObjectDetector の向こう側

pub mod blob_store;
pub mod clock;
pub mod delivery_queue;
pub mod detector;
pub mod id_generator;
pub mod image_transform;

pub use self::blob_store::{BlobError, BlobStore, validate_name};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery_queue::{DeliveryQueue, QueueError};
pub use self::detector::{DetectionFrame, ObjectDetector, RawDetection};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::image_transform::{ImageInfo, ImageTransform, Resized, TransformError};
