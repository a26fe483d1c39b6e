mod onnx;
mod preprocess;
mod service;
pub mod types;

pub use onnx::OnnxSegmenter;
pub use preprocess::{Normalization, Preprocessor};
pub use service::{SegmenterConfig, SegmenterService};
pub use types::{MaskPolarity, SegmentationMask, SegmentationModel};
