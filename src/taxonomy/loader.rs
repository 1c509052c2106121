//! Loading intent definitions from JSON files.
//!
//! Each file in the taxonomy directory holds a JSON array of
//! [`IntentDefinition`] records. Files are read in name order so the
//! resulting registry is deterministic; a malformed file fails startup
//! (the taxonomy is the contract everything else is built on).

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{KestrelError, Result};

use super::types::{IntentDefinition, Taxonomy};

/// Load every `*.json` file under `dir` into one taxonomy.
pub fn load_taxonomy_dir(dir: &Path) -> Result<Taxonomy> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .map_err(|e| KestrelError::taxonomy(format!("cannot read {}: {e}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut definitions = Vec::new();
    for path in &paths {
        let mut loaded = load_definition_file(path)?;
        definitions.append(&mut loaded);
    }

    let taxonomy = Taxonomy::from_definitions(definitions)?;
    info!(
        intents = taxonomy.len(),
        files = paths.len(),
        "taxonomy loaded"
    );
    Ok(taxonomy)
}

/// Load one definition file.
pub fn load_definition_file(path: &Path) -> Result<Vec<IntentDefinition>> {
    let content = fs::read_to_string(path)
        .map_err(|e| KestrelError::taxonomy(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| KestrelError::taxonomy(format!("invalid taxonomy file {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("cart.json")).unwrap();
        write!(
            file,
            r#"[{{
                "action_code": "ADD_TO_CART",
                "category": "CART_WISHLIST",
                "description": "Add an item to the shopping cart",
                "example_phrases": ["add this to my cart", "put in my basket"],
                "required_entities": ["product_type"],
                "priority": "HIGH"
            }}]"#
        )
        .unwrap();

        let taxonomy = load_taxonomy_dir(dir.path()).unwrap();
        assert_eq!(taxonomy.len(), 1);
        let def = taxonomy
            .get(&crate::taxonomy::ActionCode::from("ADD_TO_CART"))
            .unwrap();
        assert_eq!(def.category, "CART_WISHLIST");
        assert_eq!(def.example_phrases.len(), 2);
        assert!((def.confidence_threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        assert!(load_taxonomy_dir(dir.path()).is_err());
    }

    #[test]
    fn test_duplicate_across_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"[{
            "action_code": "VIEW_CART",
            "category": "CART_WISHLIST",
            "description": "d",
            "example_phrases": ["show my cart"]
        }]"#;
        fs::write(dir.path().join("a.json"), body).unwrap();
        fs::write(dir.path().join("b.json"), body).unwrap();
        assert!(load_taxonomy_dir(dir.path()).is_err());
    }
}
