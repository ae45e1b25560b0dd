use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pixel-space bounding box of a detected item within its source shelf image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A single metadata field extracted from a crop, with the extractor's
/// confidence when it reported one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: String,
    pub confidence: Option<f64>,
}

impl ExtractedField {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            confidence: None,
        }
    }

    #[must_use]
    pub fn with_confidence(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            value: value.into(),
            confidence: Some(confidence),
        }
    }
}

/// Metadata extracted from a shelf-item crop by the upstream extraction step.
///
/// Every field is optional — small shelf-tag fonts routinely defeat the
/// extractor. `price` is carried through for display and audit but plays no
/// role in matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub brand: Option<ExtractedField>,
    pub product_name: Option<ExtractedField>,
    pub size: Option<ExtractedField>,
    pub flavor: Option<ExtractedField>,
    pub category: Option<ExtractedField>,
    pub price: Option<ExtractedField>,
}

impl ItemMetadata {
    /// Returns the extracted brand text, if any.
    #[must_use]
    pub fn brand_value(&self) -> Option<&str> {
        self.brand.as_deref_value()
    }

    /// Returns the extracted product name text, if any.
    #[must_use]
    pub fn product_name_value(&self) -> Option<&str> {
        self.product_name.as_deref_value()
    }

    /// Returns the extracted size text, if any.
    #[must_use]
    pub fn size_value(&self) -> Option<&str> {
        self.size.as_deref_value()
    }

    /// Returns the extracted flavor text, if any.
    #[must_use]
    pub fn flavor_value(&self) -> Option<&str> {
        self.flavor.as_deref_value()
    }

    /// Builds the free-text catalog search query: brand followed by product
    /// name, whichever are present. Returns `None` when neither was
    /// extracted — such an item cannot be searched and resolves to no-match
    /// without any external call.
    #[must_use]
    pub fn search_query(&self) -> Option<String> {
        let parts: Vec<&str> = [self.brand_value(), self.product_name_value()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

trait AsDerefValue {
    fn as_deref_value(&self) -> Option<&str>;
}

impl AsDerefValue for Option<ExtractedField> {
    fn as_deref_value(&self) -> Option<&str> {
        self.as_ref().map(|f| f.value.as_str())
    }
}

/// A cropped shelf item awaiting (or holding) a catalog match.
///
/// Produced by the upstream detection + extraction steps; the matching
/// pipeline treats everything except the selected match as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedItem {
    pub id: Uuid,
    /// Source shelf image this item was cropped from.
    pub image_id: Uuid,
    /// Reference to the cropped item image handed to the vision service.
    pub crop_url: String,
    pub bounding_box: BoundingBox,
    /// Canonical retailer tag for the source image, when the store is known.
    pub retailer: Option<String>,
    pub metadata: ItemMetadata,
}
