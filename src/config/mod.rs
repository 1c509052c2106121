//! Configuration: rule-set variants, the hot-reloadable active pointer,
//! the file watcher, and environment overrides.
//!
//! A request reads the active variant exactly once at entry into the
//! decision engine, so an A/B switch mid-flight can never hand a request
//! mixed weights.

pub mod env;
pub mod manager;
pub mod types;
pub mod watcher;

pub use env::Settings;
pub use manager::ConfigManager;
pub use types::{ConfigVariant, RulesFile};
pub use watcher::spawn_config_watcher;
