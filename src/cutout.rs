use crate::error::CutoutError;
use crate::raster::{center_on_canvas, downscale_to_fit, encode_png};
use crate::segmentation::{MaskPolarity, Preprocessor, SegmentationMask, SegmenterService};
use crate::source::{png_data_url, ImageSource};
use crate::trim::{crop, find_bounds, Padding};
use image::{DynamicImage, RgbImage, RgbaImage};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CutoutOptions {
    /// Longer side of the canvas handed to the model
    pub max_working_dimension: u32,
    pub polarity: MaskPolarity,
    /// Pixels at or below this alpha are dropped from the bounding box
    pub alpha_threshold: u8,
    pub padding: Padding,
    /// Side of the square output canvas
    pub target_asset_size: u32,
    /// Largest share of the output canvas the garment may cover
    pub fit_fraction: f32,
    /// Keep original / mask / composed images for debug display
    pub diagnostics: bool,
}

impl Default for CutoutOptions {
    fn default() -> Self {
        Self {
            max_working_dimension: 512,
            polarity: MaskPolarity::Background,
            alpha_threshold: 10,
            padding: Padding::Pixels(10),
            target_asset_size: 400,
            fit_fraction: 0.9,
            diagnostics: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CutoutDiagnostics {
    /// Working canvas handed to the model
    pub original: RgbaImage,
    pub mask: RgbImage,
    /// Final asset before encoding
    pub composed: RgbaImage,
}

/// Transparent-background garment asset
#[derive(Debug, Clone)]
pub struct Cutout {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub diagnostics: Option<CutoutDiagnostics>,
}

impl Cutout {
    pub fn to_data_url(&self) -> String {
        png_data_url(&self.png)
    }
}

/// Set each pixel's alpha from the mask, never raising the source alpha
pub fn apply_mask(image: &mut RgbaImage, mask: &SegmentationMask, polarity: MaskPolarity) {
    let _span = tracing::debug_span!("apply_mask").entered();

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let alpha = polarity.alpha(mask.get(x, y));
        pixel[3] = pixel[3].min(alpha);
    }
}

/// Mask, crop and centre a working canvas into a finished asset
pub fn compose_cutout(
    mut working: RgbaImage,
    mask: &SegmentationMask,
    options: &CutoutOptions,
) -> Result<Cutout, CutoutError> {
    if mask.dimensions() != working.dimensions() {
        return Err(CutoutError::SegmentationFailed(format!(
            "mask is {:?} but image is {:?}",
            mask.dimensions(),
            working.dimensions()
        )));
    }

    let original = options.diagnostics.then(|| working.clone());

    apply_mask(&mut working, mask, options.polarity);

    let (width, height) = working.dimensions();
    let bounds = find_bounds(&working, options.alpha_threshold)
        .ok_or(CutoutError::EmptySubject)?
        .padded(options.padding, width, height);
    tracing::debug!(
        "Subject bounds {}x{} at ({}, {})",
        bounds.width(),
        bounds.height(),
        bounds.min_x,
        bounds.min_y
    );

    let composed = center_on_canvas(
        &crop(&working, bounds),
        options.target_asset_size,
        options.fit_fraction,
    );
    let png = encode_png(&composed)?;

    let diagnostics = original.map(|original| CutoutDiagnostics {
        original,
        mask: Preprocessor::mask_to_rgb(mask),
        composed: composed.clone(),
    });

    Ok(Cutout {
        png,
        width: composed.width(),
        height: composed.height(),
        diagnostics,
    })
}

/// Photo → transparent garment asset, backed by the shared segmenter
#[derive(Clone)]
pub struct ImageCutout {
    segmenter: Arc<SegmenterService>,
    options: CutoutOptions,
}

impl ImageCutout {
    pub fn new(segmenter: Arc<SegmenterService>, options: CutoutOptions) -> Self {
        Self { segmenter, options }
    }

    pub fn options(&self) -> &CutoutOptions {
        &self.options
    }

    /// Run the full cutout for one source.
    ///
    /// Checks `cancel` after every await point; a cancelled request returns
    /// [`CutoutError::Cancelled`] and produces no asset.
    pub async fn cutout(
        &self,
        source: &ImageSource,
        cancel: &CancellationToken,
    ) -> Result<Cutout, CutoutError> {
        tracing::info!("Cutting out {:?}", source);

        let owned = source.clone();
        let max_dimension = self.options.max_working_dimension;
        let working = tokio::task::spawn_blocking(move || {
            let decoded = owned.decode()?.to_rgba8();
            Ok::<_, CutoutError>(downscale_to_fit(&decoded, max_dimension))
        })
        .await??;
        if cancel.is_cancelled() {
            return Err(CutoutError::Cancelled);
        }

        let rgb = Arc::new(DynamicImage::ImageRgba8(working.clone()).to_rgb8());
        let mask = self
            .segmenter
            .segment(rgb)
            .await
            .map_err(CutoutError::segmentation)?;
        if cancel.is_cancelled() {
            return Err(CutoutError::Cancelled);
        }

        let options = self.options.clone();
        let cutout =
            tokio::task::spawn_blocking(move || compose_cutout(working, &mask, &options)).await??;
        if cancel.is_cancelled() {
            return Err(CutoutError::Cancelled);
        }

        tracing::info!("Cutout ready, {} bytes", cutout.png.len());
        Ok(cutout)
    }
}

/// Batch of cutouts processed with a fixed concurrency bound
pub struct CutoutQueue {
    cutout: ImageCutout,
    concurrency: usize,
}

impl CutoutQueue {
    /// `concurrency` of 1 processes the batch strictly one at a time
    pub fn new(cutout: ImageCutout, concurrency: usize) -> Self {
        Self {
            cutout,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Cut out every source; results come back in input order
    pub async fn run(
        &self,
        sources: Vec<ImageSource>,
        cancel: &CancellationToken,
    ) -> Vec<Result<Cutout, CutoutError>> {
        let permits = Arc::new(Semaphore::new(self.concurrency));

        let handles: Vec<_> = sources
            .into_iter()
            .map(|source| {
                let cutout = self.cutout.clone();
                let permits = Arc::clone(&permits);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    match permits.acquire_owned().await {
                        Ok(_permit) => cutout.cutout(&source, &cancel).await,
                        Err(_) => Err(CutoutError::Cancelled),
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap_or_else(|err| Err(CutoutError::Worker(err))));
        }
        results
    }
}
