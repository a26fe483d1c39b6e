use anyhow::{ensure, Result};
use image::RgbImage;
use std::str::FromStr;

/// Per-pixel segmentation scores in [0, 1], flattened in row-major order.
///
/// One value per pixel of the image that was handed to the model (the
/// downscaled working canvas, not the original photograph).
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl SegmentationMask {
    /// Build a mask, rejecting buffers that do not match the dimensions
    /// or contain non-finite scores.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        ensure!(
            data.len() == width as usize * height as usize,
            "mask has {} values, expected {}x{}",
            data.len(),
            width,
            height
        );
        ensure!(
            data.iter().all(|v| v.is_finite()),
            "mask contains non-finite scores"
        );
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }
}

/// Which class a model's mask scores measure.
///
/// The legacy pipeline assumes the scores mean "background-likeness" and
/// inverts them. Models that emit a foreground matte (RVM, U2-Net, MODNet)
/// need `Foreground`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskPolarity {
    Foreground,
    #[default]
    Background,
}

impl MaskPolarity {
    /// Alpha a pixel should keep for a given mask score
    pub fn alpha(self, score: f32) -> u8 {
        let keep = match self {
            Self::Foreground => score,
            Self::Background => 1.0 - score,
        };
        (keep.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

impl FromStr for MaskPolarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "foreground" | "fg" => Ok(Self::Foreground),
            "background" | "bg" => Ok(Self::Background),
            other => Err(format!(
                "unknown mask polarity `{other}` (expected foreground or background)"
            )),
        }
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (ONNX Runtime, test fakes, ...)
pub trait SegmentationModel: Send {
    /// Segment an image into a single mask
    ///
    /// # Returns
    /// * Mask with the same dimensions as `image`, scores 0.0-1.0
    fn segment(&mut self, image: &RgbImage) -> Result<SegmentationMask>;

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}
