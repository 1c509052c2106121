//! Rule-based entity extraction over the original query text.

use regex::Regex;

use crate::analysis::normalizer::normalize_uncached;

use super::resources::{BRANDS, COLORS, PRODUCT_TYPES};
use super::types::{Entities, PriceRange};

/// Rule-based extractor with precompiled patterns.
pub struct EntityExtractor {
    size_pattern: Regex,
    under_pattern: Regex,
    between_pattern: Regex,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor {
    /// Compile the extraction patterns.
    pub fn new() -> Self {
        Self {
            size_pattern: Regex::new(r"(?i)size\s+([A-Za-z0-9]+)").expect("static size pattern"),
            under_pattern: Regex::new(r"(?i)(?:under|below)\s*([$€£₹]?)\s*(\d+(?:\.\d+)?)")
                .expect("static under pattern"),
            between_pattern: Regex::new(
                r"(?i)(?:between|from)\s*([$€£₹]?)\s*(\d+(?:\.\d+)?)\s*(?:and|to|-)\s*([$€£₹]?)\s*(\d+(?:\.\d+)?)",
            )
            .expect("static between pattern"),
        }
    }

    /// Extract whatever the rules can find in the raw query.
    pub fn extract(&self, query: &str) -> Entities {
        let tokens = normalize_uncached(query).tokens;

        Entities {
            product_type: longest_sequence_match(&tokens, PRODUCT_TYPES),
            category: None,
            brand: longest_sequence_match(&tokens, BRANDS),
            color: token_match(&tokens, COLORS),
            size: self.extract_size(query),
            price_range: self.extract_price_range(query),
        }
    }

    fn extract_size(&self, query: &str) -> Option<String> {
        self.size_pattern
            .captures(query)
            .map(|captures| captures[1].to_string())
    }

    /// Parse "under $X", "between X and Y", and "from X to Y" forms.
    pub fn extract_price_range(&self, query: &str) -> Option<PriceRange> {
        if let Some(captures) = self.between_pattern.captures(query) {
            let currency = detect_currency(&captures[1])
                .or_else(|| detect_currency(&captures[3]))
                .or_else(|| currency_from_keywords(query));
            return Some(PriceRange {
                min: captures[2].parse().ok(),
                max: captures[4].parse().ok(),
                currency,
            });
        }
        if let Some(captures) = self.under_pattern.captures(query) {
            let currency = detect_currency(&captures[1]).or_else(|| currency_from_keywords(query));
            return Some(PriceRange {
                min: None,
                max: captures[2].parse().ok(),
                currency,
            });
        }
        None
    }
}

/// Longest token-sequence match against a vocabulary. Multi-word entries
/// beat single words covering the same span.
fn longest_sequence_match(tokens: &[String], vocabulary: &[&str]) -> Option<String> {
    let mut best: Option<&str> = None;
    for entry in vocabulary {
        let entry_tokens: Vec<&str> = entry.split_whitespace().collect();
        if entry_tokens.is_empty() || entry_tokens.len() > tokens.len() {
            continue;
        }
        let found = tokens
            .windows(entry_tokens.len())
            .any(|window| window.iter().zip(&entry_tokens).all(|(a, b)| a == b));
        if found && best.map(|b| entry.len() > b.len()).unwrap_or(true) {
            best = Some(entry);
        }
    }
    best.map(str::to_string)
}

fn token_match(tokens: &[String], vocabulary: &[&str]) -> Option<String> {
    tokens
        .iter()
        .find(|token| vocabulary.contains(&token.as_str()))
        .map(|token| token.to_string())
}

fn detect_currency(symbol: &str) -> Option<String> {
    match symbol {
        "$" => Some("USD".to_string()),
        "€" => Some("EUR".to_string()),
        "£" => Some("GBP".to_string()),
        "₹" => Some("INR".to_string()),
        _ => None,
    }
}

fn currency_from_keywords(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    for (keyword, code) in [
        ("dollar", "USD"),
        ("usd", "USD"),
        ("euro", "EUR"),
        ("eur", "EUR"),
        ("pound", "GBP"),
        ("gbp", "GBP"),
        ("rupee", "INR"),
        ("inr", "INR"),
    ] {
        if lower.contains(keyword) {
            return Some(code.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_and_color() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("find red Nike shoes");
        assert_eq!(entities.brand.as_deref(), Some("nike"));
        assert_eq!(entities.color.as_deref(), Some("red"));
        assert_eq!(entities.product_type.as_deref(), Some("shoes"));
    }

    #[test]
    fn test_multiword_brand_beats_single() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("under armour hoodie please");
        assert_eq!(entities.brand.as_deref(), Some("under armour"));
    }

    #[test]
    fn test_size() {
        let extractor = EntityExtractor::new();
        assert_eq!(
            extractor.extract("nike shoes size 42").size.as_deref(),
            Some("42")
        );
        assert_eq!(
            extractor.extract("hoodie size m").size.as_deref(),
            Some("m")
        );
        assert!(extractor.extract("no sizes here").size.is_none());
    }

    #[test]
    fn test_price_under() {
        let extractor = EntityExtractor::new();
        let range = extractor.extract_price_range("shoes under $50").unwrap();
        assert_eq!(range.min, None);
        assert_eq!(range.max, Some(50.0));
        assert_eq!(range.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_price_between() {
        let extractor = EntityExtractor::new();
        let range = extractor
            .extract_price_range("between 20 and 80 euros")
            .unwrap();
        assert_eq!(range.min, Some(20.0));
        assert_eq!(range.max, Some(80.0));
        assert_eq!(range.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_price_from_to() {
        let extractor = EntityExtractor::new();
        let range = extractor
            .extract_price_range("from $100 to $250")
            .unwrap();
        assert_eq!(range.min, Some(100.0));
        assert_eq!(range.max, Some(250.0));
        assert_eq!(range.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_no_entities() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("hello there");
        assert!(entities.is_empty());
    }
}
