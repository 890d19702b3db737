//! JobEnvelope - stage 間を運ばれる job のメタデータ
//!
//! # フィールド
//! - `image_id`: ingress で一度だけ採番。以後不変
//! - `filename`: この hop が読む blob 名（hop ごとに最新の artifact を指す）
//! - `origin_filename`: 元のアップロードの blob 名
//! - `origin_h` / `origin_w`: 元画像のサイズ。座標はすべてこの空間で表す
//! - `detections`: object-detect 以降のみ。省略時は空
//!
//! # 防御的な読み取り
//! wire 上はどのフィールドも欠けうる。必須かどうかは stage ごとに違うので、
//! ここでは `Option` のまま受け取り、`require_*` で各 stage の入口で検証する。
//! 知らないフィールドは `extra` に残して次の hop にそのまま流す（append-only）。
//! `null` は欠落と同じ扱い（`detections: null` も空配列になる）。
//!
//! 古い writer は `original_filename` キーを使い、`origin_filename: null` と並べて書くこともある。
//! 両方を別々に受け取り、読み取り時に `origin_filename` へ寄せる。書き出すのは `origin_filename` だけ。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::detection::Detection;
use super::dims::Dimensions;
use super::errors::PipelineError;
use super::ids::ImageId;

/// The per-job record passed hop to hop, one JSON object per queue entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<ImageId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_filename: Option<String>,

    /// Key older producers wrote instead of `origin_filename`. Read only.
    #[serde(default, skip_serializing)]
    pub original_filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_h: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_w: Option<u32>,

    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub detections: Vec<Detection>,

    /// Fields this version does not know about, carried forward untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobEnvelope {
    /// The first envelope of a run, as the ingress seeds it.
    pub fn for_upload(image_id: ImageId, filename: impl Into<String>, origin: Dimensions) -> Self {
        let filename = filename.into();
        Self {
            image_id: Some(image_id),
            origin_filename: Some(filename.clone()),
            filename: Some(filename),
            origin_h: Some(origin.height),
            origin_w: Some(origin.width),
            ..Self::default()
        }
    }

    /// Parse a queue record. Anything that is not a JSON object of the
    /// expected shape is a validation failure, so the worker skips it.
    pub fn from_record(record: &str) -> Result<Self, PipelineError> {
        let mut env: Self = serde_json::from_str(record)
            .map_err(|e| PipelineError::Validation(format!("unreadable envelope: {e}")))?;
        let legacy = env.original_filename.take();
        if non_empty(env.origin_filename.as_deref()).is_none()
            && non_empty(legacy.as_deref()).is_some()
        {
            env.origin_filename = legacy;
        }
        Ok(env)
    }

    pub fn to_record(&self) -> Result<String, PipelineError> {
        serde_json::to_string(self)
            .map_err(|e| PipelineError::Validation(format!("unencodable envelope: {e}")))
    }

    pub fn require_filename(&self) -> Result<&str, PipelineError> {
        non_empty(self.filename.as_deref()).ok_or_else(|| PipelineError::missing("filename"))
    }

    pub fn require_image_id(&self) -> Result<&ImageId, PipelineError> {
        self.image_id
            .as_ref()
            .filter(|id| !id.as_str().is_empty())
            .ok_or_else(|| PipelineError::missing("image_id"))
    }

    pub fn require_origin_dims(&self) -> Result<Dimensions, PipelineError> {
        let h = self.origin_h.ok_or_else(|| PipelineError::missing("origin_h"))?;
        let w = self.origin_w.ok_or_else(|| PipelineError::missing("origin_w"))?;
        Ok(Dimensions::new(w, h))
    }

    pub fn origin_filename(&self) -> Option<&str> {
        non_empty(self.origin_filename.as_deref())
            .or_else(|| non_empty(self.original_filename.as_deref()))
    }

    /// `image_id` for log fields; empty when absent.
    pub fn log_id(&self) -> &str {
        self.image_id.as_ref().map(ImageId::as_str).unwrap_or("")
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Detection>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Detection>>::deserialize(deserializer)?.unwrap_or_default())
}
