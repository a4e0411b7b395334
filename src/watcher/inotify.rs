// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::watcher::traits::{ChangeWatcher, WatchEvent};

/// Watches the local products directory for JSON file changes.
pub struct ProductFileWatcher {
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl ProductFileWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            watcher: None,
        }
    }

    fn is_product_file(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("json")
    }

    fn handle_event(event_tx: &mpsc::Sender<WatchEvent>, event: notify::Result<notify::Event>) {
        match event {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                    return;
                }
                for path in event.paths.into_iter().filter(|p| Self::is_product_file(p)) {
                    debug!(path = %path.display(), kind = ?event.kind, "Product file changed");
                    if let Err(e) = event_tx.try_send(WatchEvent::Changed(path)) {
                        warn!(error = %e, "Failed to send watcher event, receiver may be closed");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Notify watcher error");
            }
        }
    }
}

#[async_trait]
impl ChangeWatcher for ProductFileWatcher {
    async fn watch(&mut self) -> anyhow::Result<mpsc::Receiver<WatchEvent>> {
        if !self.dir.is_dir() {
            return Err(anyhow::anyhow!("Products directory does not exist: {}", self.dir.display()));
        }

        let (tx, rx) = mpsc::channel(1024);
        let mut watcher = RecommendedWatcher::new(
            move |event| {
                Self::handle_event(&tx, event);
            },
            Config::default(),
        )?;

        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;

        self.watcher = Some(watcher);
        info!(path = %self.dir.display(), "Started watching products directory");

        Ok(rx)
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        // Dropping the notify watcher ends the subscription and closes the channel
        if self.watcher.take().is_some() {
            info!(path = %self.dir.display(), "Stopped watching products directory");
        }
        Ok(())
    }
}
