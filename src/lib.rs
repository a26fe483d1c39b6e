//! Virtual wardrobe image pipeline.
//!
//! Photos of garments become transparent cutouts ([`cutout`]), cutouts are
//! trimmed to their content ([`trim`]), and selected garments are laid out
//! ([`compositor`]) and drawn over a base avatar ([`avatar`]).

pub mod anchor;
pub mod avatar;
pub mod compositor;
pub mod cutout;
pub mod error;
pub mod raster;
pub mod segmentation;
pub mod source;
pub mod trim;
pub mod wardrobe;

pub use anchor::{AnchorConfig, AnchorOverride, AnchorPoint, AnchorRegistry, Category};
pub use avatar::{AvatarRenderer, PlacedLayer, RenderPlan};
pub use compositor::{LayerCompositor, LayerInstruction, OutfitSelection};
pub use cutout::{Cutout, CutoutOptions, CutoutQueue, ImageCutout};
pub use error::{CutoutError, TrimError};
pub use source::ImageSource;
pub use trim::{TrimCache, TrimOptions, Trimmed};
pub use wardrobe::{migrate_record, GarmentAsset};
