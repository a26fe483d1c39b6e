use super::preprocess::{Normalization, Preprocessor};
use super::types::{SegmentationMask, SegmentationModel};
use anyhow::{bail, Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Single-image segmentation model run through ONNX Runtime
///
/// Expects one NCHW float input and takes the first output as the mask,
/// shaped `[1, 1, H, W]` (or `[1, H, W]`). Salient-object models such as
/// U2-Net and ISNet fit this contract.
pub struct OnnxSegmenter {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
}

impl OnnxSegmenter {
    /// Load a model from an ONNX file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `input_size` - (width, height) the model was exported for
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: (u32, u32),
        normalization: Normalization,
    ) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading segmentation model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("Segmentation model loaded successfully");

        let (width, height) = input_size;
        let preprocessor = Preprocessor::new(width, height).with_normalization(normalization);

        Ok(Self {
            session,
            preprocessor,
            width,
            height,
        })
    }
}

impl SegmentationModel for OnnxSegmenter {
    fn segment(&mut self, image: &RgbImage) -> Result<SegmentationMask> {
        let _span = tracing::debug_span!("onnx_segment").entered();

        let input_tensor = Tensor::from_array(self.preprocessor.preprocess(image)?)?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .context("Failed to run inference")?;
        drop(_infer_span);

        if outputs.len() == 0 {
            bail!("model returned no outputs");
        }

        let mask = outputs[0].try_extract_array::<f32>()?;
        let shape = mask.shape().to_vec();
        let (mask_height, mask_width) = match shape.as_slice() {
            [1, 1, h, w] | [1, h, w] => (*h, *w),
            other => bail!("unexpected mask shape {:?}", other),
        };

        let scores: Vec<f32> = mask.iter().copied().collect();

        // Back to the working canvas the caller handed us
        let (image_width, image_height) = image.dimensions();
        Preprocessor::postprocess_mask(
            &scores,
            mask_width as u32,
            mask_height as u32,
            image_width,
            image_height,
        )
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
