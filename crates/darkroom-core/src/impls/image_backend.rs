//! ImageBackend - `image` crate による ImageTransform 実装
//!
//! 出力はすべて JPEG。grayscale は 3 チャンネルに戻してから encode する
//! （後段の detector が RGB 入力を前提にしているため）。
//!
//! 矩形の上（余白が無ければ内側）に `label (0.93)` を 8x8 ビットマップフォントで描く。

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::{debug, warn};

use crate::domain::{BoxCorners, Detection, Dimensions};
use crate::ports::{ImageInfo, ImageTransform, Resized, TransformError};
use crate::rescale::clamp_to;

const BOX_THICKNESS: u32 = 2;
const PALETTE_SIZE: usize = 21;
const GLYPH: i32 = 8;
const CAPTION_GAP: i32 = 10;

pub struct ImageBackend {
    jpeg_quality: u8,
}

impl ImageBackend {
    pub fn new() -> Self {
        Self { jpeg_quality: 90 }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    fn encode(&self, img: &RgbImage) -> Result<Vec<u8>, TransformError> {
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality);
        encoder
            .encode_image(img)
            .map_err(|e| TransformError::Failed(format!("jpeg encode: {e}")))?;
        Ok(buf)
    }
}

impl Default for ImageBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn decode(bytes: &[u8]) -> Result<DynamicImage, TransformError> {
    image::load_from_memory(bytes)
        .map_err(|e| TransformError::Decode(format!("could not decode image: {e}")))
}

fn dims_of(img: &DynamicImage) -> Dimensions {
    let (w, h) = img.dimensions();
    Dimensions::new(w, h)
}

/// `percent` of `side`, truncated, never below one pixel.
fn scaled(side: u32, percent: u32) -> u32 {
    let v = u64::from(side) * u64::from(percent) / 100;
    v.clamp(1, u64::from(u32::MAX)) as u32
}

/// Stable color per label index.
pub fn label_color(index: usize) -> Rgb<u8> {
    let i = (index % PALETTE_SIZE) as u32;
    Rgb([
        ((37 * i + 80) % 256) as u8,
        ((91 * i + 40) % 256) as u8,
        ((151 * i + 160) % 256) as u8,
    ])
}

fn draw_hollow_rect(img: &mut RgbImage, bbox: BoxCorners, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    // clamp 済みなので非負
    let x0 = bbox.start_x.min(bbox.end_x).max(0) as u32;
    let x1 = bbox.start_x.max(bbox.end_x).max(0) as u32;
    let y0 = bbox.start_y.min(bbox.end_y).max(0) as u32;
    let y1 = bbox.start_y.max(bbox.end_y).max(0) as u32;

    let mut put = |x: u32, y: u32| {
        if x < w && y < h {
            img.put_pixel(x, y, color);
        }
    };

    for t in 0..BOX_THICKNESS {
        let (left, right) = (x0 + t, x1.saturating_sub(t));
        let (top, bottom) = (y0 + t, y1.saturating_sub(t));
        if left > right || top > bottom {
            break;
        }
        for x in left..=right {
            put(x, top);
            put(x, bottom);
        }
        for y in top..=bottom {
            put(left, y);
            put(right, y);
        }
    }
}

fn caption(det: &Detection) -> String {
    format!("{} ({:.2})", det.label.name, det.confidence)
}

/// Caption baseline: above the box when there is room, otherwise just inside it.
fn caption_baseline(top: i32) -> i32 {
    if top - CAPTION_GAP > CAPTION_GAP {
        top - CAPTION_GAP
    } else {
        top + CAPTION_GAP
    }
}

/// Draw `text` left-aligned at `x` with its glyph bottoms on `baseline`.
/// Pixels outside the image are dropped; characters without a glyph leave a gap.
fn draw_text(img: &mut RgbImage, x: i32, baseline: i32, text: &str, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    let top = baseline - GLYPH;
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let left = x + i as i32 * GLYPH;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH {
                if bits >> col & 1 == 0 {
                    continue;
                }
                let (px, py) = (left + col, top + row as i32);
                if px >= 0 && py >= 0 && (px as u32) < w && (py as u32) < h {
                    img.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}

impl ImageTransform for ImageBackend {
    fn inspect(&self, bytes: &[u8]) -> Result<ImageInfo, TransformError> {
        let format = image::guess_format(bytes)
            .map_err(|e| TransformError::Decode(format!("unrecognized image format: {e}")))?;
        let img = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| TransformError::Decode(format!("could not decode image: {e}")))?;
        Ok(ImageInfo {
            dimensions: dims_of(&img),
            extension: format.extensions_str().first().copied().unwrap_or("img"),
            content_type: format.to_mime_type(),
        })
    }

    fn resize(&self, bytes: &[u8], scale_percent: u32) -> Result<Resized, TransformError> {
        if scale_percent == 0 {
            return Err(TransformError::Failed("scale percent must be positive".into()));
        }
        let img = decode(bytes)?;
        let original = dims_of(&img);
        let working = Dimensions::new(
            scaled(original.width, scale_percent),
            scaled(original.height, scale_percent),
        );

        let resized = image::imageops::resize(
            &img.to_rgb8(),
            working.width,
            working.height,
            FilterType::Triangle,
        );
        debug!(%original, %working, "resized");

        Ok(Resized {
            bytes: self.encode(&resized)?,
            original,
            working,
        })
    }

    fn grayscale(&self, bytes: &[u8]) -> Result<Vec<u8>, TransformError> {
        let img = decode(bytes)?;
        let gray = DynamicImage::ImageLuma8(img.to_luma8()).to_rgb8();
        self.encode(&gray)
    }

    fn draw_detections(
        &self,
        bytes: &[u8],
        detections: &[Detection],
    ) -> Result<Vec<u8>, TransformError> {
        let mut img = decode(bytes)?.to_rgb8();
        let dims = Dimensions::new(img.width(), img.height());

        for (i, det) in detections.iter().enumerate() {
            let clamped = clamp_to(det.bbox, dims);
            if clamped != det.bbox {
                warn!(from = ?det.bbox, to = ?clamped, %dims, "clamped box to image bounds");
            }
            debug!(
                i,
                label = %det.label.name,
                confidence = det.confidence,
                bbox = ?clamped,
                "drawing detection"
            );
            let color = label_color(det.label.index);
            draw_hollow_rect(&mut img, clamped, color);
            draw_text(
                &mut img,
                clamped.start_x,
                caption_baseline(clamped.start_y),
                &caption(det),
                color,
            );
        }

        self.encode(&img)
    }
}
