use crate::error::InvalidCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Garment categories, closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tops,
    Bottoms,
    Dresses,
    Jackets,
    Shoes,
    Bags,
    Accessories,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Tops,
        Category::Bottoms,
        Category::Dresses,
        Category::Jackets,
        Category::Shoes,
        Category::Bags,
        Category::Accessories,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tops => "tops",
            Self::Bottoms => "bottoms",
            Self::Dresses => "dresses",
            Self::Jackets => "jackets",
            Self::Shoes => "shoes",
            Self::Bags => "bags",
            Self::Accessories => "accessories",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = InvalidCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == key)
            .ok_or_else(|| InvalidCategory(s.to_string()))
    }
}

/// Default placement of a category on the avatar.
///
/// `top`, `left` and `width` are percentages of the 1:2 avatar box.
/// `scale_x`/`scale_y` stretch the layer from its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorConfig {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub z_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f32>,
}

impl AnchorConfig {
    const fn at(top: f32, left: f32, width: f32, z_index: i32) -> Self {
        Self {
            top,
            left,
            width,
            z_index,
            scale_x: None,
            scale_y: None,
        }
    }
}

/// Point an item-level scale is applied around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnchorPoint {
    #[default]
    TopLeft,
    Center,
}

/// Per-garment calibration; every field is optional and falls back to the
/// category default
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnchorOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
    /// Percentage points added to `left`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_x: Option<f32>,
    /// Percentage points added to `top`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
}

/// Category default merged with an item override
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedAnchor {
    pub config: AnchorConfig,
    pub anchor: AnchorPoint,
    /// Uniform item scale, 1.0 when not overridden
    pub scale: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum AnchorTableError {
    #[error("failed to parse anchor table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("anchor table has no entry for `{0}`")]
    Missing(Category),
}

/// Placement table with exactly one entry per category
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorRegistry {
    entries: [AnchorConfig; 7],
}

impl Default for AnchorRegistry {
    fn default() -> Self {
        let mut bottoms = AnchorConfig::at(44.0, 26.0, 48.0, 10);
        // Cutouts of trousers carry extra margin at the waist
        bottoms.scale_x = Some(1.0);
        bottoms.scale_y = Some(1.12);

        // Same order as Category
        Self {
            entries: [
                AnchorConfig::at(19.0, 21.0, 58.0, 20),
                bottoms,
                AnchorConfig::at(19.0, 20.0, 60.0, 15),
                AnchorConfig::at(18.0, 16.0, 68.0, 30),
                AnchorConfig::at(87.0, 30.0, 40.0, 5),
                AnchorConfig::at(46.0, 62.0, 30.0, 35),
                AnchorConfig::at(4.0, 35.0, 30.0, 40),
            ],
        }
    }
}

impl AnchorRegistry {
    /// Parse a `category -> config` JSON object; every category must be present
    pub fn from_json(json: &str) -> Result<Self, AnchorTableError> {
        let table: BTreeMap<Category, AnchorConfig> = serde_json::from_str(json)?;
        let mut registry = Self::default();
        for category in Category::ALL {
            let config = table
                .get(&category)
                .ok_or(AnchorTableError::Missing(category))?;
            registry.set(category, *config);
        }
        Ok(registry)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let table: BTreeMap<Category, AnchorConfig> = Category::ALL
            .into_iter()
            .map(|category| (category, *self.get(category)))
            .collect();
        serde_json::to_string_pretty(&table)
    }

    pub fn get(&self, category: Category) -> &AnchorConfig {
        &self.entries[category.index()]
    }

    pub fn set(&mut self, category: Category, config: AnchorConfig) {
        self.entries[category.index()] = config;
    }

    /// Merge the category default with an item override, field by field
    pub fn resolve(&self, category: Category, item: Option<&AnchorOverride>) -> ResolvedAnchor {
        let base = *self.get(category);
        let Some(item) = item else {
            return ResolvedAnchor {
                config: base,
                anchor: AnchorPoint::TopLeft,
                scale: 1.0,
            };
        };

        let mut config = base;
        config.top = item.top.unwrap_or(base.top);
        config.left = item.left.unwrap_or(base.left);
        config.width = item.width.unwrap_or(base.width);
        config.z_index = item.z_index.unwrap_or(base.z_index);
        if let Some(dx) = item.offset_x {
            config.left += dx;
        }
        if let Some(dy) = item.offset_y {
            config.top += dy;
        }

        ResolvedAnchor {
            config,
            anchor: item.anchor.unwrap_or_default(),
            scale: item.scale.unwrap_or(1.0),
        }
    }
}
