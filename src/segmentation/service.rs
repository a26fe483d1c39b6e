use super::onnx::OnnxSegmenter;
use super::preprocess::Normalization;
use super::types::{SegmentationMask, SegmentationModel};
use anyhow::{anyhow, ensure, Context, Result};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell, Semaphore};

type ModelFactory = dyn Fn() -> Result<Box<dyn SegmentationModel>> + Send + Sync;
type SharedModel = Arc<Mutex<Box<dyn SegmentationModel>>>;

const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Callers admitted to the model at once. The model is a single
    /// instance, so inferences themselves never overlap; this bounds how many
    /// requests hold a place at the front of the queue
    pub max_concurrent_inferences: usize,
    /// Upper bound on a single inference; time spent queued for a permit or
    /// for the model is not counted
    pub inference_timeout: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_inferences: 1,
            inference_timeout: Duration::from_secs(DEFAULT_INFERENCE_TIMEOUT_SECS),
        }
    }
}

/// Shared handle to the segmentation model.
///
/// The model is built on first use and reused for the lifetime of the
/// service; concurrent first calls wait on the same initialization. Each
/// inference runs on the blocking pool behind a semaphore so a batch of
/// cutouts cannot flood the inference backend.
pub struct SegmenterService {
    factory: Arc<ModelFactory>,
    model: OnceCell<SharedModel>,
    permits: Arc<Semaphore>,
    config: SegmenterConfig,
}

impl SegmenterService {
    pub fn new<F>(config: SegmenterConfig, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn SegmentationModel>> + Send + Sync + 'static,
    {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_inferences.max(1)));
        Self {
            factory: Arc::new(factory),
            model: OnceCell::new(),
            permits,
            config,
        }
    }

    /// Service backed by an ONNX model file, loaded on first use
    pub fn onnx(
        model_path: impl Into<PathBuf>,
        input_size: (u32, u32),
        normalization: Normalization,
        config: SegmenterConfig,
    ) -> Self {
        let model_path = model_path.into();
        Self::new(config, move || {
            let model = OnnxSegmenter::new(&model_path, input_size, normalization)?;
            Ok(Box::new(model) as Box<dyn SegmentationModel>)
        })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<SharedModel> {
        self.model
            .get_or_try_init(|| async {
                tracing::info!("Initializing segmentation model");
                let factory = Arc::clone(&self.factory);
                let model = tokio::task::spawn_blocking(move || factory())
                    .await
                    .context("model init worker join failed")??;
                tracing::info!("Segmentation model ready, input size {:?}", model.input_size());
                Ok::<_, anyhow::Error>(Arc::new(Mutex::new(model)))
            })
            .await
            .cloned()
    }

    /// Segment `image`, returning a mask with the image's dimensions.
    ///
    /// Waits for a permit and for the shared model before the inference
    /// timeout starts. A timed-out inference keeps its permit and the model
    /// until the backend returns, so the next caller queues instead of
    /// starting its timer against a busy model.
    pub async fn segment(&self, image: Arc<RgbImage>) -> Result<SegmentationMask> {
        let timeout = self.config.inference_timeout;
        let expected = image.dimensions();

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .context("inference queue closed")?;
        let mut model = self.model().await?.lock_owned().await;

        let inference = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            model.segment(&image)
        });

        let mask = tokio::time::timeout(timeout, inference)
            .await
            .map_err(|_| anyhow!("inference timed out after {:?}", timeout))?
            .context("inference worker join failed")??;

        ensure!(
            mask.dimensions() == expected,
            "model returned a {:?} mask for a {:?} image",
            mask.dimensions(),
            expected
        );
        Ok(mask)
    }
}
