//! Wire types for the catalog search response.

use rust_decimal::Decimal;
use serde::Deserialize;
use shelfmatch_core::CandidateProduct;

/// Top-level search response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub products: Vec<CatalogProduct>,
}

/// One product record as the catalog service returns it.
///
/// Kept separate from [`CandidateProduct`] so catalog schema drift stays
/// contained in this crate.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogProduct {
    /// Stable catalog key (GTIN-like).
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub retailers: Vec<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl From<CatalogProduct> for CandidateProduct {
    fn from(raw: CatalogProduct) -> Self {
        // Empty strings from sparse catalog rows are treated as absent.
        let brand = raw.brand.filter(|s| !s.is_empty());
        let size_text = raw.size.filter(|s| !s.is_empty());
        CandidateProduct {
            catalog_key: raw.id,
            title: raw.title,
            brand,
            size_text,
            image_urls: raw.images,
            retailers: raw.retailers,
            price: raw.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_treats_empty_strings_as_absent() {
        let raw = CatalogProduct {
            id: "0049000050103".to_string(),
            title: "Coca-Cola Classic 12oz Can".to_string(),
            brand: Some(String::new()),
            size: Some(String::new()),
            images: vec![],
            retailers: vec![],
            price: None,
        };
        let candidate: CandidateProduct = raw.into();
        assert!(candidate.brand.is_none());
        assert!(candidate.size_text.is_none());
    }

    #[test]
    fn conversion_preserves_populated_fields() {
        let raw = CatalogProduct {
            id: "0049000050103".to_string(),
            title: "Coca-Cola Classic 12oz Can".to_string(),
            brand: Some("Coca-Cola".to_string()),
            size: Some("12 oz".to_string()),
            images: vec!["https://img.example.com/coke.jpg".to_string()],
            retailers: vec!["kroger".to_string(), "target".to_string()],
            price: None,
        };
        let candidate: CandidateProduct = raw.into();
        assert_eq!(candidate.catalog_key, "0049000050103");
        assert_eq!(candidate.brand.as_deref(), Some("Coca-Cola"));
        assert_eq!(candidate.retailers.len(), 2);
    }

    #[test]
    fn search_response_parses_empty_product_list() {
        let parsed: SearchResponse =
            serde_json::from_str(r#"{"products": []}"#).expect("parse empty response");
        assert!(parsed.products.is_empty());
    }
}
