// SPDX-License-Identifier: GPL-3.0-only
pub mod inotify;
pub mod poll;
pub mod traits;

use std::sync::Arc;

use crate::config::Config;
use crate::store::{BackendKind, ProductStore};

pub use inotify::ProductFileWatcher;
pub use poll::SnapshotPoller;
pub use traits::{ChangeWatcher, WatchEvent};

/// Change source for the active backend. Sheets has none.
pub fn build_watcher(config: &Config, remote: &Arc<dyn ProductStore>) -> Option<Box<dyn ChangeWatcher>> {
    match config.backend {
        BackendKind::Firestore => Some(Box::new(SnapshotPoller::new(
            Arc::clone(remote),
            std::time::Duration::from_secs(config.firestore.watch_interval_secs),
        ))),
        BackendKind::Local => Some(Box::new(ProductFileWatcher::new(&config.products_dir))),
        BackendKind::Sheets => None,
    }
}
