//! Entity validation and normalization.

use tracing::debug;

use super::resources::{BRANDS, BRAND_PROPER_CASE, COLORS, CURRENCIES, MAX_PLAUSIBLE_PRICE};
use super::types::Entities;

/// Validates and normalizes extracted entities.
///
/// Unknown-but-plausible values are retained with a warning; logically
/// invalid values (bad ranges, negative prices) are reset to null.
#[derive(Debug, Default)]
pub struct EntityValidator;

impl EntityValidator {
    /// Create a validator.
    pub fn new() -> Self {
        Self
    }

    /// Normalize in place and return warnings for the audit trail.
    pub fn validate(&self, entities: &mut Entities) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(brand) = entities.brand.take() {
            let (normalized, warning) = normalize_brand(&brand);
            entities.brand = Some(normalized);
            warnings.extend(warning);
        }

        if let Some(color) = entities.color.take() {
            let (normalized, warning) = normalize_color(&color);
            entities.color = Some(normalized);
            warnings.extend(warning);
        }

        if let Some(category) = entities.category.take() {
            entities.category = Some(category.trim().to_lowercase());
        }

        if let Some(product_type) = entities.product_type.take() {
            entities.product_type = Some(product_type.trim().to_lowercase());
        }

        if let Some(size) = entities.size.take() {
            // Letter sizes go uppercase; numeric sizes are unaffected.
            entities.size = Some(size.trim().to_uppercase());
        }

        if let Some(range) = entities.price_range.as_mut() {
            if let (Some(min), Some(max)) = (range.min, range.max) {
                if min > max {
                    warnings.push(format!("invalid price range: min {min} > max {max}"));
                    range.min = None;
                    range.max = None;
                }
            }
            if range.min.is_some_and(|v| v < 0.0) {
                warnings.push("negative min price".to_string());
                range.min = None;
            }
            if range.max.is_some_and(|v| v < 0.0) {
                warnings.push("negative max price".to_string());
                range.max = None;
            }
            if range.max.is_some_and(|v| v > MAX_PLAUSIBLE_PRICE) {
                warnings.push(format!(
                    "implausible max price {}",
                    range.max.unwrap_or_default()
                ));
                range.max = None;
            }
            if let Some(currency) = range.currency.take() {
                let upper = currency.trim().to_uppercase();
                if CURRENCIES.contains(&upper.as_str()) {
                    range.currency = Some(upper);
                } else {
                    warnings.push(format!("unknown currency {currency}"));
                }
            }
            if range.is_empty() {
                entities.price_range = None;
            }
        }

        if !warnings.is_empty() {
            debug!(?warnings, "entity validation warnings");
        }
        warnings
    }

    /// Validate, then collapse an all-empty set to `None`.
    pub fn finalize(&self, mut entities: Entities) -> (Option<Entities>, Vec<String>) {
        let warnings = self.validate(&mut entities);
        if entities.is_empty() {
            (None, warnings)
        } else {
            (Some(entities), warnings)
        }
    }
}

fn normalize_brand(brand: &str) -> (String, Option<String>) {
    let lower = brand.trim().to_lowercase();
    if let Some((_, proper)) = BRAND_PROPER_CASE.iter().find(|(key, _)| *key == lower) {
        return (proper.to_string(), None);
    }
    let title = title_case(&lower);
    if BRANDS.contains(&lower.as_str()) {
        (title, None)
    } else {
        (title, Some(format!("unknown brand: {brand}")))
    }
}

fn normalize_color(color: &str) -> (String, Option<String>) {
    let mut lower = color.trim().to_lowercase();
    if lower == "grey" {
        lower = "gray".to_string();
    }
    if COLORS.contains(&lower.as_str()) {
        (lower, None)
    } else {
        let warning = format!("unknown color: {color}");
        (lower, Some(warning))
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
