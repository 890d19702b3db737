//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryDeliveryQueue**: 単一プロセス用の配送キュー
//! - **RedisDeliveryQueue**: プロセスをまたぐ配送キュー
//! - **InMemoryBlobStore** / **LocalBlobStore** / **S3BlobStore**: blob store
//! - **ImageBackend**: `image` crate による画像処理
//! - **OrtDetector**: ONNX Runtime による MobileNet-SSD 物体検出
//! - **NullDetector** / **ScriptedDetector**: モデル無し・テスト用の物体検出

pub mod detector;
pub mod image_backend;
pub mod inmem_blob;
pub mod inmem_delivery;
pub mod local_blob;
pub mod ort_detector;
pub mod redis_delivery;
pub mod s3_blob;

pub use self::detector::{NullDetector, ScriptedDetector};
pub use self::image_backend::ImageBackend;
pub use self::inmem_blob::InMemoryBlobStore;
pub use self::inmem_delivery::InMemoryDeliveryQueue;
pub use self::local_blob::LocalBlobStore;
pub use self::ort_detector::OrtDetector;
pub use self::redis_delivery::RedisDeliveryQueue;
pub use self::s3_blob::{S3BlobStore, S3Settings};
