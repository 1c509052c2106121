//! Built-in seed taxonomy and keyword dictionary.
//!
//! Deployments load their full taxonomy and dictionaries from files;
//! these built-ins keep the binary usable without data directories and
//! give the tests a realistic corpus.

use crate::keyword::loader::{KeywordEntry, KeywordPattern};
use crate::taxonomy::{ActionCode, EntityKind, IntentDefinition, IntentPriority, Taxonomy};

fn definition(
    code: &str,
    category: &str,
    description: &str,
    priority: IntentPriority,
    required: &[EntityKind],
    optional: &[EntityKind],
    examples: &[&str],
) -> IntentDefinition {
    IntentDefinition {
        action_code: ActionCode::from(code),
        category: category.to_string(),
        description: description.to_string(),
        example_phrases: examples.iter().map(|e| e.to_string()).collect(),
        required_entities: required.to_vec(),
        optional_entities: optional.to_vec(),
        confidence_threshold: 0.7,
        priority,
    }
}

/// The seed intent definitions.
pub fn seed_definitions() -> Vec<IntentDefinition> {
    use EntityKind::*;
    vec![
        definition(
            "ADD_TO_CART",
            "CART_WISHLIST",
            "Add an item to the shopping cart",
            IntentPriority::High,
            &[],
            &[ProductType, Brand, Color, Size],
            &[
                "add this to my cart",
                "put it in my basket",
                "add item to cart",
                "i will take this one",
                "add these sneakers to my basket",
            ],
        ),
        definition(
            "REMOVE_FROM_CART",
            "CART_WISHLIST",
            "Remove an item from the shopping cart",
            IntentPriority::High,
            &[],
            &[ProductType],
            &[
                "take this out of my basket",
                "remove it from my cart",
                "i do not want this anymore",
                "get rid of this item",
                "delete this from the cart",
            ],
        ),
        definition(
            "VIEW_CART",
            "CART_WISHLIST",
            "Show the contents of the shopping cart",
            IntentPriority::Medium,
            &[],
            &[],
            &[
                "show my cart",
                "what is in my basket",
                "open my shopping cart",
                "view cart contents",
                "cart summary please",
            ],
        ),
        definition(
            "CHECKOUT",
            "CHECKOUT_PAYMENT",
            "Start the checkout flow",
            IntentPriority::Critical,
            &[],
            &[],
            &[
                "proceed to checkout",
                "buy now",
                "place my order",
                "go to payment",
                "complete my purchase",
            ],
        ),
        definition(
            "TRACK_ORDER",
            "ORDERS_FULFILLMENT",
            "Report the delivery status of an order",
            IntentPriority::High,
            &[],
            &[],
            &[
                "track my order",
                "where is my order",
                "order status please",
                "when will my package arrive",
                "delivery status of my purchase",
            ],
        ),
        definition(
            "VIEW_ORDERS",
            "ORDERS_FULFILLMENT",
            "List past orders",
            IntentPriority::Medium,
            &[],
            &[],
            &[
                "show my orders",
                "order history",
                "my past purchases",
                "list everything i bought",
                "view my previous orders",
            ],
        ),
        definition(
            "SEARCH_PRODUCT",
            "SEARCH_DISCOVERY",
            "Search the catalog for products",
            IntentPriority::Medium,
            &[],
            &[ProductType, Category, Brand, Color, Size, PriceRange],
            &[
                "find red shoes",
                "search for wireless headphones",
                "show me summer dresses",
                "i am looking for a laptop",
                "browse running sneakers",
            ],
        ),
        definition(
            "GET_PRODUCT_DETAILS",
            "PRODUCT_DETAILS",
            "Show details for a specific product",
            IntentPriority::Medium,
            &[ProductType],
            &[Brand],
            &[
                "tell me about this product",
                "show the specs",
                "details of this item",
                "what sizes does this come in",
                "more information please",
            ],
        ),
        definition(
            "CONTACT_SUPPORT",
            "SUPPORT_HELP",
            "Reach customer support",
            IntentPriority::High,
            &[],
            &[],
            &[
                "contact customer support",
                "i need help from a person",
                "get me customer service",
                "talk to an agent",
                "help desk please",
            ],
        ),
        definition(
            "REQUEST_REFUND",
            "RETURNS_REFUNDS",
            "Request a refund for a purchase",
            IntentPriority::Critical,
            &[],
            &[],
            &[
                "i want a refund",
                "refund this purchase",
                "give me my money back",
                "cancel and refund",
                "request a refund please",
            ],
        ),
        definition(
            "ADD_TO_WISHLIST",
            "CART_WISHLIST",
            "Save an item to the wishlist",
            IntentPriority::Low,
            &[],
            &[ProductType],
            &[
                "add to wishlist",
                "save this for later",
                "put it on my list",
                "save to favorites",
                "wishlist this item",
            ],
        ),
        definition(
            "VIEW_WISHLIST",
            "CART_WISHLIST",
            "Show the wishlist",
            IntentPriority::Low,
            &[],
            &[],
            &[
                "show my wishlist",
                "my saved items",
                "view my favorites",
                "open my list",
                "what did i save for later",
            ],
        ),
    ]
}

/// The seed taxonomy.
pub fn seed_taxonomy() -> Taxonomy {
    Taxonomy::from_definitions(seed_definitions()).expect("seed taxonomy is valid")
}

fn entry(code: &str, priority: u8, keywords: &[&str]) -> KeywordEntry {
    use crate::analysis::normalizer::normalize_uncached;
    let patterns = keywords
        .iter()
        .map(|keyword| {
            let normalized = normalize_uncached(keyword);
            KeywordPattern::Literal {
                normalized: normalized.text.clone(),
                tokens: normalized.tokens,
            }
        })
        .collect();
    KeywordEntry {
        action_code: ActionCode::from(code),
        priority,
        patterns,
    }
}

/// The seed keyword dictionary.
pub fn seed_keyword_entries() -> Vec<KeywordEntry> {
    vec![
        entry(
            "ADD_TO_CART",
            1,
            &["add to cart", "add to basket", "put in cart", "put in basket"],
        ),
        entry(
            "REMOVE_FROM_CART",
            1,
            &["remove from cart", "remove from basket", "take out of basket"],
        ),
        entry(
            "VIEW_CART",
            2,
            &["show my cart", "view cart", "my basket", "cart contents"],
        ),
        entry(
            "CHECKOUT",
            1,
            &["checkout", "buy now", "place order", "proceed to payment"],
        ),
        entry(
            "TRACK_ORDER",
            1,
            &["track my order", "where is my order", "order status", "tracking"],
        ),
        entry(
            "VIEW_ORDERS",
            2,
            &["my orders", "order history", "past purchases"],
        ),
        entry(
            "SEARCH_PRODUCT",
            3,
            &["search", "find", "looking for", "show me"],
        ),
        entry(
            "GET_PRODUCT_DETAILS",
            3,
            &["product details", "tell me about", "specifications"],
        ),
        entry(
            "CONTACT_SUPPORT",
            1,
            &["customer support", "customer service", "talk to an agent", "help desk"],
        ),
        entry(
            "REQUEST_REFUND",
            1,
            &["refund", "money back", "cancel and refund"],
        ),
        entry(
            "ADD_TO_WISHLIST",
            2,
            &["add to wishlist", "save for later", "add to favorites"],
        ),
        entry(
            "VIEW_WISHLIST",
            2,
            &["my wishlist", "saved items", "my favorites"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_taxonomy_valid() {
        let taxonomy = seed_taxonomy();
        assert!(taxonomy.len() >= 10);
        for definition in taxonomy.definitions() {
            assert!(definition.example_phrases.len() >= 5);
        }
    }

    #[test]
    fn test_seed_keywords_cover_taxonomy() {
        let taxonomy = seed_taxonomy();
        for entry in seed_keyword_entries() {
            assert!(
                taxonomy.contains(&entry.action_code),
                "keyword entry {} has no intent definition",
                entry.action_code
            );
            assert!(!entry.patterns.is_empty());
            assert!((1..=9).contains(&entry.priority));
        }
    }
}
