//! Entity value types.

use serde::{Deserialize, Serialize};

/// A price constraint. When both bounds are present, `min <= max`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl PriceRange {
    /// Whether any bound is set.
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Structured entities extracted from an utterance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
}

impl Entities {
    /// Whether every field is empty.
    pub fn is_empty(&self) -> bool {
        self.product_type.is_none()
            && self.category.is_none()
            && self.brand.is_none()
            && self.color.is_none()
            && self.size.is_none()
            && self
                .price_range
                .as_ref()
                .map(|p| p.is_empty())
                .unwrap_or(true)
    }

    /// Fill empty fields of `self` from `other`.
    pub fn backfill_from(&mut self, other: Entities) {
        if self.product_type.is_none() {
            self.product_type = other.product_type;
        }
        if self.category.is_none() {
            self.category = other.category;
        }
        if self.brand.is_none() {
            self.brand = other.brand;
        }
        if self.color.is_none() {
            self.color = other.color;
        }
        if self.size.is_none() {
            self.size = other.size;
        }
        if self.price_range.as_ref().map(|p| p.is_empty()).unwrap_or(true) {
            self.price_range = other.price_range;
        }
    }
}
