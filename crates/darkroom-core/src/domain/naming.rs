//! Stage identity and the blob naming policy.
//!
//! 出力名は `<stage-prefix>-<input-name>`。prefix は上書きではなく積み重なるので、
//! ファイル名そのものが provenance chain（どの stage をどの順で通ったか）になる。
//!
//! 例: `image_x.jpg` → `resized-image_x.jpg` → `grayscale-resized-image_x.jpg`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four pipeline stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    Resize,
    Grayscale,
    ObjectDetect,
    Tag,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Resize,
        StageKind::Grayscale,
        StageKind::ObjectDetect,
        StageKind::Tag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Resize => "resize",
            StageKind::Grayscale => "grayscale",
            StageKind::ObjectDetect => "object-detect",
            StageKind::Tag => "tag",
        }
    }

    /// Prefix this stage puts in front of its input name.
    /// Object-detect writes no blob and therefore has none.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            StageKind::Resize => Some("resized"),
            StageKind::Grayscale => Some("grayscale"),
            StageKind::ObjectDetect => None,
            StageKind::Tag => Some("tagged"),
        }
    }

    /// Output blob name for `input`, or `None` for stages that write nothing.
    pub fn output_name(self, input: &str) -> Option<String> {
        self.prefix().map(|p| derive_name(p, input))
    }

    fn from_prefix(prefix: &str) -> Option<StageKind> {
        StageKind::ALL
            .into_iter()
            .find(|k| k.prefix() == Some(prefix))
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown stage '{0}' (expected resize, grayscale, object-detect or tag)")]
pub struct UnknownStage(String);

impl FromStr for StageKind {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resize" => Ok(StageKind::Resize),
            "grayscale" => Ok(StageKind::Grayscale),
            "object-detect" | "objectdetect" | "detect" => Ok(StageKind::ObjectDetect),
            "tag" => Ok(StageKind::Tag),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

pub fn derive_name(prefix: &str, input: &str) -> String {
    format!("{prefix}-{input}")
}

/// Split one known stage prefix off the front of `name`.
fn split_prefix(name: &str) -> Option<(StageKind, &str)> {
    let (head, rest) = name.split_once('-')?;
    let kind = StageKind::from_prefix(head)?;
    if rest.is_empty() {
        return None;
    }
    Some((kind, rest))
}

/// Recover the original upload name by removing every leading stage prefix.
///
/// `grayscale-resized-image_1.jpg` → `image_1.jpg`. A name with no known
/// prefix is returned unchanged.
pub fn strip_provenance(name: &str) -> &str {
    let mut current = name;
    while let Some((_, rest)) = split_prefix(current) {
        current = rest;
    }
    current
}

/// Stages recorded in `name`, in the order they were applied.
pub fn provenance_chain(name: &str) -> Vec<StageKind> {
    let mut chain = Vec::new();
    let mut current = name;
    while let Some((kind, rest)) = split_prefix(current) {
        chain.push(kind);
        current = rest;
    }
    // 先頭の prefix が最後に適用された stage
    chain.reverse();
    chain
}
