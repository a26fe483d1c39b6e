use crate::source::SourceError;

/// Failures of the photo → cutout pipeline
#[derive(Debug, thiserror::Error)]
pub enum CutoutError {
    /// The source could not be read or decoded into pixels
    #[error("image decode failed: {0}")]
    ImageDecodeFailed(#[from] SourceError),

    /// No usable mask: model unavailable, inference error, malformed output or timeout
    #[error("segmentation failed: {0}")]
    SegmentationFailed(String),

    /// The model ran but nothing survived the alpha threshold
    #[error("no foreground subject found in image")]
    EmptySubject,

    /// The caller stopped waiting for the result
    #[error("cutout cancelled")]
    Cancelled,

    #[error("failed to encode cutout: {0}")]
    Encode(#[from] image::ImageError),

    #[error("cutout worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl CutoutError {
    pub(crate) fn segmentation(err: anyhow::Error) -> Self {
        Self::SegmentationFailed(format!("{err:#}"))
    }
}

/// Failures of the transparent-margin trim
#[derive(Debug, thiserror::Error)]
pub enum TrimError {
    #[error("image decode failed: {0}")]
    ImageDecodeFailed(#[from] SourceError),

    #[error("trim cancelled")]
    Cancelled,

    #[error("failed to encode trimmed image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("trim worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// A category key outside the closed set of garment categories
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid garment category `{0}`")]
pub struct InvalidCategory(pub String);
