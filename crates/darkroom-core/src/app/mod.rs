//! App - アプリケーション層
//!
//! ports を組み合わせて pipeline を動かす。
//!
//! # 主要コンポーネント
//! - **PipelineBuilder**: collaborator のワイヤリングと起動時検証
//! - **StageWorker**: stage 共通の実行ループ（pop→fetch→transform→store→forward）
//! - **stages**: resize / grayscale / object-detect / tag
//! - **ingress**: `POST /grab` で job を投入する HTTP gateway
//! - **config**: キュー名と数値パラメータ

pub mod builder;
pub mod config;
pub mod ingress;
pub mod stages;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Pipeline, PipelineBuilder};
pub use self::config::{ConfigError, PipelineConfig, QueueNames};
pub use self::ingress::IngressState;
pub use self::worker_loop::{Artifact, HopOutcome, Stage, StageOutput, StageWorker};
