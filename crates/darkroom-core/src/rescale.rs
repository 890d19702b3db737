//! Coordinate rescaler.
//!
//! detect stage は resize 済みの小さい画像（working frame）で推論するが、
//! 下流（tag stage など）は元画像の座標を期待する。ここで変換する。
//!
//! `scale_x = origin_w / w`, `scale_y = origin_h / h` を各座標に掛けて整数に切り捨てる。
//! working と origin が同じなら scale は 1.0 で、結果は入力と一致する。
//! その場合も特別扱いせず、同じ計算を通す。

use crate::domain::{BoxCorners, Dimensions, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    /// Factors that map `working` pixel space onto `origin` pixel space.
    pub fn between(working: Dimensions, origin: Dimensions) -> Result<Self, PipelineError> {
        if working.is_empty() {
            return Err(PipelineError::Transform(format!(
                "cannot rescale from an empty working frame ({working})"
            )));
        }
        Ok(Self {
            x: f64::from(origin.width) / f64::from(working.width),
            y: f64::from(origin.height) / f64::from(working.height),
        })
    }

    pub fn apply(&self, bbox: BoxCorners) -> BoxCorners {
        BoxCorners {
            start_x: scale_coord(bbox.start_x, self.x),
            start_y: scale_coord(bbox.start_y, self.y),
            end_x: scale_coord(bbox.end_x, self.x),
            end_y: scale_coord(bbox.end_y, self.y),
        }
    }
}

fn scale_coord(v: i32, factor: f64) -> i32 {
    // `as` truncates toward zero
    (f64::from(v) * factor) as i32
}

/// Clamp every corner into `[0, width-1] x [0, height-1]`.
///
/// x coordinates are clamped against the width, y against the height.
pub fn clamp_to(bbox: BoxCorners, dims: Dimensions) -> BoxCorners {
    let max_x = dims.width.saturating_sub(1).min(i32::MAX as u32) as i32;
    let max_y = dims.height.saturating_sub(1).min(i32::MAX as u32) as i32;
    BoxCorners {
        start_x: bbox.start_x.clamp(0, max_x),
        start_y: bbox.start_y.clamp(0, max_y),
        end_x: bbox.end_x.clamp(0, max_x),
        end_y: bbox.end_y.clamp(0, max_y),
    }
}
