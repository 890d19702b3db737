//! Domain identifiers.
//!
//! `ImageId` は 1 回の pipeline run を識別する。ingress で一度だけ採番され、
//! 以降どの stage でも書き換えない。
//!
//! 採番は ULID（`IdGenerator` 経由）だが、wire 上はただの文字列として扱う。
//! 他の producer が UUID などを入れてきても、そのまま運べるようにするため。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of one upload and every artifact derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Ulid> for ImageId {
    fn from(ulid: Ulid) -> Self {
        // 小文字にしておくとファイル名に埋め込んだ時に読みやすい
        Self(ulid.to_string().to_lowercase())
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_id_serializes_as_plain_string() {
        let id = ImageId::new("3f2a");
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"3f2a\"");

        let back: ImageId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ulid_ids_are_lowercase() {
        let id = ImageId::from(Ulid::new());
        assert_eq!(id.as_str(), id.as_str().to_lowercase());
        assert_eq!(id.as_str().len(), 26);
    }

    #[test]
    fn foreign_ids_pass_through() {
        let uuid = "9b2e4c1a-0f47-4a55-9d0e-1c7d8f3b2a61";
        let id: ImageId = serde_json::from_str(&format!("\"{uuid}\"")).unwrap();
        assert_eq!(id.to_string(), uuid);
    }
}
