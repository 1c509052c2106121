//! Configuration file watcher.
//!
//! Polls the rules file's modification time and asks the manager to
//! reload on change. Polling keeps the watcher free of platform-specific
//! file-event plumbing; the manager ignores no-op and invalid updates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::manager::ConfigManager;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Spawn the watcher task. It exits when `shutdown` flips to `true`.
pub fn spawn_config_watcher(
    manager: Arc<ConfigManager>,
    path: PathBuf,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(file = %path.display(), interval_ms = poll_interval.as_millis() as u64, "config watcher started");

    tokio::spawn(async move {
        let mut last_mtime = mtime(&path);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("config watcher stopping");
                        return;
                    }
                    continue;
                }
            }

            let current = mtime(&path);
            if current != last_mtime {
                last_mtime = current;
                match manager.reload_from_file() {
                    Ok(true) => {}
                    Ok(false) => debug!("config file touched but content unchanged or invalid"),
                    Err(e) => warn!(error = %e, "config reload failed"),
                }
            }
        }
    })
}

fn mtime(path: &PathBuf) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
