//! Garment records handed to the compositor, and migration of stored
//! records written by older app versions.

use crate::anchor::{AnchorOverride, Category};
use crate::error::InvalidCategory;
use crate::source::{ImageSource, SourceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SCHEMA_VERSION: u32 = 2;

/// Legacy spellings of the image location, most preferred first
const IMAGE_FIELDS: [&str; 4] = ["imageSource", "imageUrl", "imageUri", "image"];

/// A saved clothing item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarmentAsset {
    pub schema_version: u32,
    pub id: String,
    pub category: Category,
    /// File path or `data:` URL of the cutout
    pub image_source: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_override: Option<AnchorOverride>,
}

impl GarmentAsset {
    pub fn new(id: impl Into<String>, category: Category, image_source: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            id: id.into(),
            category,
            image_source: image_source.into(),
            created_at: Utc::now(),
            anchor_override: None,
        }
    }

    /// New record with a random id
    pub fn create(category: Category, image_source: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), category, image_source)
    }

    pub fn source(&self) -> Result<ImageSource, SourceError> {
        ImageSource::parse(&self.image_source)
    }
}

/// Fields a migration had to invent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultedField {
    SchemaVersion,
    Id,
    CreatedAt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub asset: GarmentAsset,
    pub defaulted: Vec<DefaultedField>,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("garment record is not a JSON object")]
    NotAnObject,

    #[error("garment record is missing `{0}`")]
    MissingField(&'static str),

    #[error(transparent)]
    InvalidCategory(#[from] InvalidCategory),

    #[error("garment record field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("garment record schema version {0} is newer than supported {}", SCHEMA_VERSION)]
    UnsupportedVersion(u64),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> MigrationError {
    MigrationError::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// Bring a stored record of unknown vintage to the current schema.
///
/// `now` stamps records that never had a creation time.
pub fn migrate_record(value: &Value, now: DateTime<Utc>) -> Result<Migrated, MigrationError> {
    let record = value.as_object().ok_or(MigrationError::NotAnObject)?;
    let mut defaulted = Vec::new();

    match record.get("schemaVersion").and_then(Value::as_u64) {
        Some(version) if version > u64::from(SCHEMA_VERSION) => {
            return Err(MigrationError::UnsupportedVersion(version));
        }
        Some(_) => {}
        None => defaulted.push(DefaultedField::SchemaVersion),
    }

    let id = match record.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        // Early builds keyed items with Date.now()
        Some(Value::Number(id)) => id.to_string(),
        None | Some(Value::Null) | Some(Value::String(_)) => {
            defaulted.push(DefaultedField::Id);
            uuid::Uuid::new_v4().to_string()
        }
        Some(other) => return Err(invalid("id", format!("unexpected value {other}"))),
    };

    let category = match record.get("category") {
        Some(Value::String(category)) => category.parse::<Category>()?,
        Some(other) => return Err(invalid("category", format!("unexpected value {other}"))),
        None => return Err(MigrationError::MissingField("category")),
    };

    let image_source = image_location(record).ok_or(MigrationError::MissingField("imageSource"))?;

    let created_at = match record.get("createdAt") {
        Some(Value::String(stamp)) => DateTime::parse_from_rfc3339(stamp)
            .map(|stamp| stamp.with_timezone(&Utc))
            .map_err(|e| invalid("createdAt", e.to_string()))?,
        Some(Value::Number(millis)) => millis
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| invalid("createdAt", format!("{millis} is not a timestamp")))?,
        None | Some(Value::Null) => {
            defaulted.push(DefaultedField::CreatedAt);
            now
        }
        Some(other) => return Err(invalid("createdAt", format!("unexpected value {other}"))),
    };

    let anchor_override = match record.get("anchorOverride") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value::<AnchorOverride>(raw.clone())
                .map_err(|e| invalid("anchorOverride", e.to_string()))?,
        ),
    };

    if !defaulted.is_empty() {
        tracing::debug!("Migrated garment {} with defaults for {:?}", id, defaulted);
    }

    Ok(Migrated {
        asset: GarmentAsset {
            schema_version: SCHEMA_VERSION,
            id,
            category,
            image_source,
            created_at,
            anchor_override,
        },
        defaulted,
    })
}

fn image_location(record: &Map<String, Value>) -> Option<String> {
    IMAGE_FIELDS
        .iter()
        .filter_map(|field| record.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|location| !location.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn current_record_migrates_without_defaults() {
        let value = json!({
            "schemaVersion": 2,
            "id": "a1",
            "category": "tops",
            "imageSource": "/wardrobe/a1.png",
            "createdAt": "2024-02-01T08:30:00Z",
            "anchorOverride": { "scale": 1.2, "offsetY": -1.5 }
        });

        let migrated = migrate_record(&value, now()).unwrap();
        assert!(migrated.defaulted.is_empty());
        assert_eq!(migrated.asset.id, "a1");
        assert_eq!(migrated.asset.category, Category::Tops);
        let anchor = migrated.asset.anchor_override.unwrap();
        assert_eq!(anchor.scale, Some(1.2));
        assert_eq!(anchor.offset_y, Some(-1.5));
    }

    #[test]
    fn legacy_record_uses_image_aliases_and_reports_defaults() {
        let value = json!({
            "category": "Bottoms",
            "imageUrl": "",
            "imageUri": "file:///data/jeans.png"
        });

        let migrated = migrate_record(&value, now()).unwrap();
        assert_eq!(migrated.asset.image_source, "file:///data/jeans.png");
        assert_eq!(migrated.asset.created_at, now());
        assert_eq!(migrated.asset.schema_version, SCHEMA_VERSION);
        assert_eq!(
            migrated.defaulted,
            vec![
                DefaultedField::SchemaVersion,
                DefaultedField::Id,
                DefaultedField::CreatedAt
            ]
        );
        assert!(!migrated.asset.id.is_empty());
    }

    #[test]
    fn numeric_ids_and_millisecond_timestamps_are_accepted() {
        let value = json!({
            "schemaVersion": 1,
            "id": 1709294400000u64,
            "category": "shoes",
            "image": "data:image/png;base64,AAAA",
            "createdAt": 1709294400000u64
        });

        let migrated = migrate_record(&value, now()).unwrap();
        assert_eq!(migrated.asset.id, "1709294400000");
        assert_eq!(migrated.asset.created_at, now());
    }

    #[test]
    fn unknown_category_is_rejected() {
        let value = json!({ "category": "hats", "imageUrl": "/x.png" });
        assert!(matches!(
            migrate_record(&value, now()),
            Err(MigrationError::InvalidCategory(_))
        ));
    }

    #[test]
    fn missing_image_is_rejected() {
        let value = json!({ "category": "bags" });
        assert!(matches!(
            migrate_record(&value, now()),
            Err(MigrationError::MissingField("imageSource"))
        ));
    }

    #[test]
    fn future_schema_is_rejected() {
        let value = json!({ "schemaVersion": 9, "category": "bags", "imageUrl": "/b.png" });
        assert!(matches!(
            migrate_record(&value, now()),
            Err(MigrationError::UnsupportedVersion(9))
        ));
        assert!(matches!(
            migrate_record(&json!([1, 2]), now()),
            Err(MigrationError::NotAnObject)
        ));
    }

    #[test]
    fn asset_serializes_in_current_schema() {
        let asset = GarmentAsset::new("z9", Category::Dresses, "/d.png");
        let value = serde_json::to_value(&asset).unwrap();

        assert_eq!(value["schemaVersion"], 2);
        assert_eq!(value["category"], "dresses");
        assert!(value.get("anchorOverride").is_none());

        let back = migrate_record(&value, now()).unwrap();
        assert_eq!(back.asset, asset);
    }
}
