// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc::Receiver;

use crate::catalog::Product;

/// Unsolicited change in the product source.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A product file changed on disk; the list must be re-read
    Changed(PathBuf),

    /// The remote store pushed a full list
    Snapshot(Vec<Product>),
}

#[async_trait]
pub trait ChangeWatcher: Send + Sync {
    /// Start watching and return a receiver for events
    async fn watch(&mut self) -> anyhow::Result<Receiver<WatchEvent>>;

    /// Stop watching
    async fn stop(&mut self) -> anyhow::Result<()>;
}
