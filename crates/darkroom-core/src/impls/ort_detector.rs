//! OrtDetector - MobileNet-SSD (VOC 20 クラス) を ONNX Runtime で動かす ObjectDetector
//!
//! 入力は 300x300、BGR、CHW、`(px - 127.5) * 0.007843` で正規化する。
//! 出力は `[1, 1, N, 7]`、各行が `[batch, class, confidence, x1, y1, x2, y2]`（0..1 の正規化座標）。
//! 座標は working frame（受け取った画像）の幅・高さを掛けて整数に切り捨てる。
//! confidence の足切りは stage 側でやるので、ここでは全行を返す。

use std::path::Path;
use std::sync::Mutex;

use image::DynamicImage;
use image::imageops::FilterType;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use tracing::{debug, info};

use crate::domain::{BoxCorners, Dimensions};
use crate::impls::image_backend::decode;
use crate::ports::{DetectionFrame, ObjectDetector, RawDetection, TransformError};

const INPUT_SIDE: u32 = 300;
const MEAN: f32 = 127.5;
const SCALE: f32 = 0.007843;
const ROW: usize = 7;

pub struct OrtDetector {
    // Session::run は &mut self
    session: Mutex<Session>,
    input_name: String,
}

fn failed(e: impl std::fmt::Display) -> TransformError {
    TransformError::Failed(format!("object detection failed: {e}"))
}

impl OrtDetector {
    /// Load an ONNX MobileNet-SSD model from disk.
    pub fn open(model_path: impl AsRef<Path>) -> Result<Self, TransformError> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(TransformError::Failed(format!(
                "detection model not found: {}",
                model_path.display()
            )));
        }
        info!(model = %model_path.display(), "loading detection model");

        let session = Session::builder()
            .map_err(failed)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(failed)?
            .with_intra_threads(4)
            .map_err(failed)?
            .commit_from_file(model_path)
            .map_err(failed)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| TransformError::Failed("detection model has no inputs".into()))?;
        info!(input = %input_name, "detection model ready");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    fn infer(&self, tensor: Vec<f32>) -> Result<Vec<f32>, TransformError> {
        let side = INPUT_SIDE as usize;
        let shape = [1, 3, side, side];
        let value = ort::value::Value::from_array((shape.as_slice(), tensor.into_boxed_slice()))
            .map_err(failed)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| TransformError::Failed("detection session poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(failed)?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(failed)?;
        Ok(data.to_vec())
    }
}

impl ObjectDetector for OrtDetector {
    fn detect(&self, bytes: &[u8]) -> Result<DetectionFrame, TransformError> {
        let img = decode(bytes)?;
        let working = Dimensions::new(img.width(), img.height());

        let output = self.infer(input_tensor(&img))?;
        let detections = parse_ssd_output(&output, working);
        debug!(%working, rows = output.len() / ROW, kept = detections.len(), "inference done");

        Ok(DetectionFrame {
            working,
            detections,
        })
    }
}

/// Resize to the network input and lay the pixels out as normalized BGR planes.
fn input_tensor(img: &DynamicImage) -> Vec<f32> {
    let rgb = img
        .resize_exact(INPUT_SIDE, INPUT_SIDE, FilterType::Triangle)
        .to_rgb8();
    let plane = (INPUT_SIDE * INPUT_SIDE) as usize;
    let mut tensor = vec![0.0f32; 3 * plane];
    for (i, px) in rgb.pixels().enumerate() {
        // RGB -> BGR
        for (c, channel) in [2, 1, 0].into_iter().enumerate() {
            tensor[c * plane + i] = (f32::from(px[channel]) - MEAN) * SCALE;
        }
    }
    tensor
}

/// Rows of `[batch, class, confidence, x1, y1, x2, y2]` to working-frame boxes.
fn parse_ssd_output(output: &[f32], working: Dimensions) -> Vec<RawDetection> {
    let w = f64::from(working.width);
    let h = f64::from(working.height);
    output
        .chunks_exact(ROW)
        .filter(|row| row[1] >= 0.0 && row[2].is_finite())
        .map(|row| {
            let px = |v: f32, side: f64| (f64::from(v) * side) as i32;
            RawDetection {
                bbox: BoxCorners::new(px(row[3], w), px(row[4], h), px(row[5], w), px(row[6], h)),
                class_index: row[1] as usize,
                confidence: f64::from(row[2]),
            }
        })
        .collect()
}
