//! Stages - 4 つの stage の実装
//!
//! | stage         | 入力 blob                      | 出力 blob            | 下流          |
//! |---------------|--------------------------------|----------------------|---------------|
//! | resize        | `filename`                     | `resized-<in>`       | grayscale     |
//! | grayscale     | `filename`                     | `grayscale-<in>`     | object-detect |
//! | object-detect | `filename`                     | なし                 | tag           |
//! | tag           | `origin_filename`（原画像）     | `tagged-<filename>`  | なし（終端）  |
//!
//! 画像処理は CPU を塞ぐので spawn_blocking に逃がす。

use std::sync::Arc;

use crate::domain::{PipelineError, StageKind};
use crate::ports::TransformError;

pub mod detect;
pub mod grayscale;
pub mod resize;
pub mod tag;

pub use self::detect::ObjectDetectStage;
pub use self::grayscale::GrayscaleStage;
pub use self::resize::ResizeStage;
pub use self::tag::TagStage;

/// Run a synchronous image call on the blocking pool.
pub(crate) async fn blocking<S, T, F>(service: Arc<S>, f: F) -> Result<T, PipelineError>
where
    S: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, TransformError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| PipelineError::Transform(format!("transform task aborted: {e}")))?
        .map_err(PipelineError::from)
}

/// Output name for a stage that always writes a blob.
pub(crate) fn output_name(kind: StageKind, input: &str) -> Result<String, PipelineError> {
    kind.output_name(input)
        .ok_or_else(|| PipelineError::Transform(format!("{kind} does not write a blob")))
}
