//! Outfit selection → per-layer draw geometry.
//!
//! Pure and synchronous: cheap enough to rerun on every outfit change or
//! tuck toggle.

use crate::anchor::{AnchorPoint, AnchorRegistry, Category};
use crate::wardrobe::GarmentAsset;
use std::collections::BTreeMap;

/// Paint sequence; z-index still decides stacking
pub const RENDER_ORDER: [Category; 7] = [
    Category::Shoes,
    Category::Bottoms,
    Category::Dresses,
    Category::Tops,
    Category::Jackets,
    Category::Bags,
    Category::Accessories,
];

/// z-indices forced while the top is tucked into the bottom
const TUCKED_Z_INDEX: [(Category, i32); 2] = [(Category::Tops, 10), (Category::Bottoms, 25)];

pub fn tucked_z_index(category: Category) -> Option<i32> {
    TUCKED_Z_INDEX
        .iter()
        .find(|(tucked, _)| *tucked == category)
        .map(|(_, z_index)| *z_index)
}

/// Axis-aligned rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Garments picked for the current outfit, at most one per category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutfitSelection {
    slots: BTreeMap<Category, GarmentAsset>,
}

impl OutfitSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `garment` in its category's slot, returning whatever it replaced
    pub fn select(&mut self, garment: GarmentAsset) -> Option<GarmentAsset> {
        self.slots.insert(garment.category, garment)
    }

    pub fn clear(&mut self, category: Category) -> Option<GarmentAsset> {
        self.slots.remove(&category)
    }

    pub fn get(&self, category: Category) -> Option<&GarmentAsset> {
        self.slots.get(&category)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Scale applied to a placed layer.
///
/// The category stretch (`scale_x`, `scale_y`) pivots on the top-left
/// corner; the item scale then pivots on `origin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub item_scale: f32,
    pub origin: AnchorPoint,
}

impl LayerTransform {
    pub const IDENTITY: Self = Self {
        scale_x: 1.0,
        scale_y: 1.0,
        item_scale: 1.0,
        origin: AnchorPoint::TopLeft,
    };

    pub fn is_identity(&self) -> bool {
        self.scale_x == 1.0 && self.scale_y == 1.0 && self.item_scale == 1.0
    }

    /// Offset of the scaled box from the stretched box's top-left corner,
    /// in percent of the untransformed layer size
    fn translate_percent(&self) -> (f32, f32) {
        match self.origin {
            AnchorPoint::TopLeft => (0.0, 0.0),
            AnchorPoint::Center => {
                let shrink = 1.0 - self.item_scale;
                (shrink * self.scale_x * 50.0, shrink * self.scale_y * 50.0)
            }
        }
    }

    pub fn apply(&self, rect: Rect) -> Rect {
        let stretched_width = rect.width * self.scale_x;
        let stretched_height = rect.height * self.scale_y;
        let width = stretched_width * self.item_scale;
        let height = stretched_height * self.item_scale;

        let (x, y) = match self.origin {
            AnchorPoint::TopLeft => (rect.x, rect.y),
            AnchorPoint::Center => (
                rect.x + (stretched_width - width) / 2.0,
                rect.y + (stretched_height - height) / 2.0,
            ),
        };

        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// One garment layer, positioned in percentages of the avatar box
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInstruction {
    pub garment_id: String,
    pub category: Category,
    pub image_source: String,
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub z_index: i32,
    pub transform: LayerTransform,
}

impl LayerInstruction {
    /// Inline style for an absolutely positioned element in the avatar box
    pub fn to_css(&self) -> String {
        let mut css = format!(
            "position: absolute; top: {}%; left: {}%; width: {}%; z-index: {};",
            self.top, self.left, self.width, self.z_index
        );
        if !self.transform.is_identity() {
            let t = &self.transform;
            let (tx, ty) = t.translate_percent();
            // CSS applies the right-most function first; the whole chain
            // pivots on the top-left corner
            css.push_str(&format!(
                " transform: translate({}%, {}%) scale({}) scale({}, {}); transform-origin: top left;",
                css_number(tx),
                css_number(ty),
                css_number(t.item_scale),
                css_number(t.scale_x),
                css_number(t.scale_y),
            ));
        }
        css
    }
}

fn css_number(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}

pub struct LayerCompositor {
    registry: AnchorRegistry,
}

impl LayerCompositor {
    pub fn new(registry: AnchorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AnchorRegistry {
        &self.registry
    }

    /// Draw list for `selection`, in paint order.
    ///
    /// When `tucked_in` the top and bottom take their tucked z-indices
    /// regardless of configuration; otherwise every layer keeps its
    /// resolved z-index.
    pub fn compose(&self, selection: &OutfitSelection, tucked_in: bool) -> Vec<LayerInstruction> {
        RENDER_ORDER
            .iter()
            .filter_map(|&category| {
                let garment = selection.get(category)?;
                let resolved = self
                    .registry
                    .resolve(category, garment.anchor_override.as_ref());
                let config = resolved.config;

                let z_index = match tucked_z_index(category) {
                    Some(z_index) if tucked_in => z_index,
                    _ => config.z_index,
                };

                Some(LayerInstruction {
                    garment_id: garment.id.clone(),
                    category,
                    image_source: garment.image_source.clone(),
                    top: config.top,
                    left: config.left,
                    width: config.width,
                    z_index,
                    transform: LayerTransform {
                        scale_x: config.scale_x.unwrap_or(1.0),
                        scale_y: config.scale_y.unwrap_or(1.0),
                        item_scale: resolved.scale,
                        origin: resolved.anchor,
                    },
                })
            })
            .collect()
    }
}
