mod bounds;
mod cache;

pub use bounds::{crop, find_bounds, BoundingBox, Padding};
pub use cache::{trim_image, TrimCache, TrimOptions, Trimmed};
