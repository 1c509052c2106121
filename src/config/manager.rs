//! The configuration manager.
//!
//! Holds every loaded variant plus an atomic "active" pointer. Request
//! paths call [`ConfigManager::active`] once at entry and carry that
//! snapshot; reloads and A/B switches swap the pointer without touching
//! in-flight requests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{KestrelError, Result};

use super::types::{ConfigVariant, RulesFile};

#[derive(Debug)]
struct State {
    variants: BTreeMap<String, Arc<ConfigVariant>>,
    active: Arc<ConfigVariant>,
}

/// Thread-safe owner of the rule-set variants.
#[derive(Debug)]
pub struct ConfigManager {
    state: RwLock<State>,
    /// Source file, when file-backed.
    path: Option<PathBuf>,
    /// Where timestamped backups of replaced configs go.
    versions_dir: Option<PathBuf>,
    /// Raw content of the currently loaded file, for backup on change.
    last_content: RwLock<Option<String>>,
}

impl ConfigManager {
    /// Create a manager from in-memory variants.
    pub fn from_variants(variants: Vec<ConfigVariant>, active: &str) -> Result<Self> {
        let mut map = BTreeMap::new();
        for variant in variants {
            variant.validate()?;
            map.insert(variant.name.clone(), Arc::new(variant));
        }
        let active = map
            .get(active)
            .cloned()
            .ok_or_else(|| KestrelError::config(format!("unknown active variant {active}")))?;
        Ok(Self {
            state: RwLock::new(State {
                variants: map,
                active,
            }),
            path: None,
            versions_dir: None,
            last_content: RwLock::new(None),
        })
    }

    /// Create a manager with a single default variant.
    pub fn with_default(variant: ConfigVariant) -> Result<Self> {
        let name = variant.name.clone();
        Self::from_variants(vec![variant], &name)
    }

    /// Load a manager from a rules file; backups of replaced versions are
    /// written next to it under `versions/`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| KestrelError::config(format!("cannot read {}: {e}", path.display())))?;
        let file = RulesFile::parse(&content)?;

        let versions_dir = path
            .parent()
            .map(|parent| parent.join("versions"))
            .unwrap_or_else(|| PathBuf::from("versions"));

        let mut manager = Self::from_rules(file)?;
        manager.path = Some(path.to_path_buf());
        manager.versions_dir = Some(versions_dir);
        *manager.last_content.write() = Some(content);
        Ok(manager)
    }

    fn from_rules(file: RulesFile) -> Result<Self> {
        let variants: Vec<ConfigVariant> =
            file.rules.rule_sets.into_values().collect();
        Self::from_variants(variants, &file.active_variant)
    }

    /// The active variant snapshot. Callers hold the returned `Arc` for
    /// the duration of their request.
    pub fn active(&self) -> Arc<ConfigVariant> {
        Arc::clone(&self.state.read().active)
    }

    /// Names of all loaded variants.
    pub fn variant_names(&self) -> Vec<String> {
        self.state.read().variants.keys().cloned().collect()
    }

    /// Switch the active variant for A/B rollouts.
    pub fn switch_variant(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        let variant = state
            .variants
            .get(name)
            .cloned()
            .ok_or_else(|| KestrelError::config(format!("unknown variant {name}")))?;
        state.active = variant;
        info!(variant = name, "switched active config variant");
        Ok(())
    }

    /// Re-read the backing file. Invalid content is ignored with a warning
    /// and the previous configuration stays active; valid content first
    /// gets the old file backed up into the versions folder, then the
    /// pointer swaps.
    pub fn reload_from_file(&self) -> Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let content = fs::read_to_string(path)
            .map_err(|e| KestrelError::config(format!("cannot read {}: {e}", path.display())))?;

        if self.last_content.read().as_deref() == Some(content.as_str()) {
            return Ok(false);
        }

        let file = match RulesFile::parse(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "ignoring invalid config update");
                return Ok(false);
            }
        };

        self.backup_previous(path);

        let mut map = BTreeMap::new();
        for (name, variant) in file.rules.rule_sets {
            map.insert(name, Arc::new(variant));
        }
        let active = map
            .get(&file.active_variant)
            .cloned()
            .expect("parse validated the active variant");

        {
            let mut state = self.state.write();
            state.variants = map;
            state.active = active;
        }
        *self.last_content.write() = Some(content);
        info!(file = %path.display(), "configuration reloaded");
        Ok(true)
    }

    fn backup_previous(&self, path: &Path) {
        let (Some(dir), Some(previous)) =
            (&self.versions_dir, self.last_content.read().clone())
        else {
            return;
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("config");
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let backup = dir.join(format!("{stem}_{timestamp}.json"));
        if let Err(e) = fs::create_dir_all(dir).and_then(|_| fs::write(&backup, previous)) {
            warn!(error = %e, "could not write config backup");
        }
    }
}
