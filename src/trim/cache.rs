use super::bounds::{crop, find_bounds, BoundingBox, Padding};
use crate::error::TrimError;
use crate::raster::{downscale_to_fit, encode_png};
use crate::source::ImageSource;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct TrimOptions {
    /// Pixels at or below this alpha count as empty
    pub alpha_threshold: u8,
    pub padding: Padding,
    /// Decode budget; larger images are downscaled before scanning
    pub max_working_dimension: Option<u32>,
}

impl Default for TrimOptions {
    fn default() -> Self {
        Self {
            alpha_threshold: 10,
            padding: Padding::Relative(0.035),
            max_working_dimension: Some(1024),
        }
    }
}

/// Result of trimming one source
#[derive(Debug, Clone, PartialEq)]
pub enum Trimmed {
    /// Cropped to the visible content
    Cropped {
        png: Vec<u8>,
        width: u32,
        height: u32,
        /// Crop rectangle in the (possibly downscaled) working canvas
        bounds: BoundingBox,
    },
    /// Nothing visible; the source is handed back untouched
    Original(ImageSource),
}

impl Trimmed {
    /// Image to draw, as a source the renderer can decode
    pub fn source(&self, key: &str) -> ImageSource {
        match self {
            Self::Cropped { png, .. } => ImageSource::memory(format!("trim:{key}"), png.clone()),
            Self::Original(source) => source.clone(),
        }
    }
}

/// Crop `image` to its visible content plus padding.
///
/// `None` when no pixel exceeds the alpha threshold.
pub fn trim_image(image: &RgbaImage, options: &TrimOptions) -> Option<(RgbaImage, BoundingBox)> {
    let _span = tracing::debug_span!("trim").entered();

    let (width, height) = image.dimensions();
    let bounds = find_bounds(image, options.alpha_threshold)?.padded(options.padding, width, height);
    Some((crop(image, bounds), bounds))
}

fn trim_source(source: &ImageSource, options: &TrimOptions) -> Result<Trimmed, TrimError> {
    let decoded = source.decode()?.to_rgba8();
    let working = match options.max_working_dimension {
        Some(max) => downscale_to_fit(&decoded, max),
        None => decoded,
    };

    match trim_image(&working, options) {
        Some((cropped, bounds)) => Ok(Trimmed::Cropped {
            png: encode_png(&cropped)?,
            width: cropped.width(),
            height: cropped.height(),
            bounds,
        }),
        None => {
            tracing::debug!("{:?} is fully transparent, keeping original", source);
            Ok(Trimmed::Original(source.clone()))
        }
    }
}

/// Memoized trim keyed by source identity.
///
/// Each source is trimmed at most once; concurrent requests for the same
/// uncached source share a single in-flight computation. Entries are never
/// evicted.
#[derive(Default)]
pub struct TrimCache {
    options: TrimOptions,
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<Trimmed>>>>>,
}

impl TrimCache {
    pub fn new(options: TrimOptions) -> Self {
        Self {
            options,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &TrimOptions {
        &self.options
    }

    /// Already-computed result for `key`, without doing any work
    pub fn cached(&self, key: &str) -> Option<Arc<Trimmed>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of completed entries
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Trim `source`, reusing the cached result when there is one.
    ///
    /// A request cancelled before its work finishes returns
    /// [`TrimError::Cancelled`] and leaves the cache untouched.
    pub async fn trim(
        &self,
        source: &ImageSource,
        cancel: &CancellationToken,
    ) -> Result<Arc<Trimmed>, TrimError> {
        let key = source.key();
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }
        if cancel.is_cancelled() {
            return Err(TrimError::Cancelled);
        }

        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        let trimmed = cell
            .get_or_try_init(|| async {
                if cancel.is_cancelled() {
                    return Err(TrimError::Cancelled);
                }
                let owned = source.clone();
                let options = self.options.clone();
                let trimmed =
                    tokio::task::spawn_blocking(move || trim_source(&owned, &options)).await??;

                if cancel.is_cancelled() {
                    tracing::debug!("Discarding trim of {:?}, request cancelled", source);
                    return Err(TrimError::Cancelled);
                }
                tracing::debug!("Cached trim for {:?}", source);
                Ok(Arc::new(trimmed))
            })
            .await?;

        Ok(Arc::clone(trimmed))
    }
}
