//! Ingress - HTTP でアップロードを受け付け、pipeline に最初の job を投入する
//!
//! `POST /grab`（body = 画像バイナリそのもの）
//!
//! 1. image_id を採番
//! 2. 一度だけ decode して原寸（origin_h / origin_w）を取る。decode できなければ 400
//! 3. `image_<image_id>.<ext>` で blob store に保存
//! 4. 最初の envelope を entry queue（resize）に push
//!
//! 下流の完了は待たない。成功時は `{"status":"uploaded","filename":...}`、
//! 失敗時は `{"error":...}` を返し、プロセスは落とさない。
//!
//! 保存後の push が失敗すると blob だけが残る（孤児）。消さずに名前をログに出す。

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::app::stages::blocking;
use crate::domain::{JobEnvelope, PipelineError};
use crate::ports::{BlobStore, DeliveryQueue, IdGenerator, ImageTransform};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uploaded {
    pub status: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFailed {
    pub error: String,
}

/// Everything the gateway needs to seed one job.
pub struct IngressState {
    pub queue: Arc<dyn DeliveryQueue>,
    pub blobs: Arc<dyn BlobStore>,
    pub transform: Arc<dyn ImageTransform>,
    pub ids: Arc<dyn IdGenerator>,
    pub entry_queue: String,
}

impl IngressState {
    /// Store the upload and enqueue its first envelope. Returns the stored name.
    pub async fn accept(&self, payload: Vec<u8>) -> Result<String, PipelineError> {
        if payload.is_empty() {
            return Err(PipelineError::Decode("empty upload".into()));
        }

        let image_id = self.ids.generate_image_id();
        let size = payload.len();

        let (payload, info) = blocking(self.transform.clone(), move |t| {
            let info = t.inspect(&payload)?;
            Ok((payload, info))
        })
        .await?;

        let filename = format!("image_{image_id}.{}", info.extension);
        info!(%image_id, %filename, size, origin = %info.dimensions, "grabbed an image");

        self.blobs.put(&filename, payload, info.content_type).await?;

        let envelope = JobEnvelope::for_upload(image_id.clone(), filename.clone(), info.dimensions);
        if let Err(e) = self.queue.push(&self.entry_queue, envelope.to_record()?).await {
            error!(
                %image_id,
                %filename,
                queue = %self.entry_queue,
                error = %e,
                "enqueue failed; stored upload is orphaned"
            );
            return Err(e.into());
        }
        info!(%image_id, queue = %self.entry_queue, "seeded pipeline");

        Ok(filename)
    }
}

/// `POST /grab` router with request tracing and an upload size cap.
pub fn router(state: Arc<IngressState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/grab", post(grab))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn grab(State(state): State<Arc<IngressState>>, body: Bytes) -> Response {
    match state.accept(body.to_vec()).await {
        Ok(filename) => (
            StatusCode::OK,
            Json(Uploaded {
                status: "uploaded".to_string(),
                filename,
            }),
        )
            .into_response(),
        Err(err) => {
            let status = match &err {
                PipelineError::Decode(_) | PipelineError::Validation(_) => {
                    warn!(error = %err, "rejected upload");
                    StatusCode::BAD_REQUEST
                }
                _ => {
                    error!(error = %err, details = ?err, "failed to handle upload");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (
                status,
                Json(UploadFailed {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}
