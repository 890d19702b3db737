//! darkroom-core
//!
//! Core building blocks for the darkroom image pipeline.
//!
//! アップロードされた画像は独立した stage（resize → grayscale → object-detect → tag）を
//! 順に通る。stage 同士はキューに流れる JSON の envelope だけでつながり、
//! 画像本体は blob store に置く。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（envelope, detection, ids, 命名ポリシー, errors）
//! - **ports**: 抽象化レイヤー（DeliveryQueue, BlobStore, ImageTransform, ObjectDetector, IdGenerator, Clock）
//! - **app**: アプリケーションロジック（builder, worker_loop, stages, ingress, config）
//! - **impls**: 実装（in-memory / Redis キュー、ローカル blob store、`image` crate バックエンド）
//! - **rescale**: working frame の box 座標を原画像の座標に戻す
//! - **worker**: stage worker を tokio task として束ねる WorkerGroup

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod rescale;
pub mod worker;

pub use self::worker::WorkerGroup;
