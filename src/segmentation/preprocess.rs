use super::types::SegmentationMask;
use anyhow::Result;
use image::{imageops, RgbImage};
use ndarray::Array4;

/// Per-channel normalization applied after scaling pixels to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// Plain [0, 1] scaling
    pub const UNIT: Self = Self {
        mean: [0.0, 0.0, 0.0],
        std: [1.0, 1.0, 1.0],
    };

    /// ImageNet statistics, used by U2-Net style salient-object models
    pub const IMAGENET: Self = Self {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };
}

impl Default for Normalization {
    fn default() -> Self {
        Self::UNIT
    }
}

/// Preprocessor for converting RGB images to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    normalization: Normalization,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
            normalization: Normalization::UNIT,
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float, scale to [0, 1], apply mean/std
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        // Resize if needed
        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let Normalization { mean, std } = self.normalization;

        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                let value = pixel[channel] as f32 / 255.0;
                tensor[[0, channel, y as usize, x as usize]] = (value - mean[channel]) / std[channel];
            }
        }

        Ok(tensor)
    }

    /// Resize a model-resolution mask to the working canvas dimensions
    ///
    /// # Arguments
    /// * `scores` - Flattened mask at model resolution
    /// * `mask_width`, `mask_height` - Model output dimensions
    /// * `target_width`, `target_height` - Working canvas dimensions
    pub fn postprocess_mask(
        scores: &[f32],
        mask_width: u32,
        mask_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<SegmentationMask> {
        let _span = tracing::debug_span!("postprocess").entered();

        let mask = SegmentationMask::new(mask_width, mask_height, scores.to_vec())?;
        if mask.dimensions() == (target_width, target_height) {
            return Ok(mask);
        }

        // Quantize through a grayscale image for resizing
        let gray_image = image::GrayImage::from_fn(mask_width, mask_height, |x, y| {
            let value = (mask.get(x, y) * 255.0).clamp(0.0, 255.0) as u8;
            image::Luma([value])
        });

        // Triangle avoids the ringing Lanczos adds around hard mask edges
        let resized = imageops::resize(
            &gray_image,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        let data = resized.pixels().map(|p| p[0] as f32 / 255.0).collect();
        SegmentationMask::new(target_width, target_height, data)
    }

    /// Convert a mask to a grayscale RGB image for visualization
    pub fn mask_to_rgb(mask: &SegmentationMask) -> RgbImage {
        RgbImage::from_fn(mask.width, mask.height, |x, y| {
            let value = (mask.get(x, y) * 255.0).clamp(0.0, 255.0) as u8;
            image::Rgb([value, value, value])
        })
    }
}
