//! Detection records carried in the envelope from the object-detect hop onward.
//!
//! Coordinates are always expressed in the *original* upload's pixel space
//! (see [`crate::rescale`]).

use serde::{Deserialize, Serialize};

/// Class names of the MobileNet-SSD (VOC) model, indexed by class id.
pub const VOC_LABELS: [&str; 21] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tvmonitor",
];

/// Name used when a detector reports a class id outside the table.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Look up the label name for a class index.
pub fn label_name(index: usize) -> &'static str {
    VOC_LABELS.get(index).copied().unwrap_or(UNKNOWN_LABEL)
}

/// Integer box corners. Serialized with the camelCase keys the wire format uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxCorners {
    #[serde(rename = "startX")]
    pub start_x: i32,
    #[serde(rename = "startY")]
    pub start_y: i32,
    #[serde(rename = "endX")]
    pub end_x: i32,
    #[serde(rename = "endY")]
    pub end_y: i32,
}

impl BoxCorners {
    pub fn new(start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Self {
        Self {
            start_x,
            start_y,
            end_x,
            end_y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub index: usize,
}

impl Label {
    pub fn from_index(index: usize) -> Self {
        Self {
            name: label_name(index).to_string(),
            index,
        }
    }
}

/// One detected object.
///
/// The box is flattened so the JSON shape is
/// `{"startX":..,"startY":..,"endX":..,"endY":..,"label":{..},"confidence":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoxCorners,
    pub label: Label,
    pub confidence: f64,
}
