// SPDX-License-Identifier: GPL-3.0-only
pub mod firestore;
pub mod local_json;
pub mod sheets;
pub mod traits;

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::catalog::CategoryRegistry;
use crate::config::Config;

pub use firestore::FirestoreStore;
pub use local_json::LocalJsonStore;
pub use sheets::SheetsStore;
pub use traits::{BackendKind, ProductStore};

/// Instantiate the configured remote store
pub fn build_store(config: &Config, categories: &CategoryRegistry) -> anyhow::Result<Arc<dyn ProductStore>> {
    let store: Arc<dyn ProductStore> = match config.backend {
        BackendKind::Sheets => {
            let url = config
                .sheets
                .script_url
                .as_deref()
                .context("sheets.script_url is not set")?;
            Arc::new(SheetsStore::new(url, config.request_timeout(), config.probe_timeout())?)
        }
        BackendKind::Firestore => Arc::new(FirestoreStore::new(
            &config.firestore,
            config.request_timeout(),
            config.probe_timeout(),
        )?),
        BackendKind::Local => Arc::new(LocalJsonStore::new(&config.products_dir, categories.clone())),
    };

    info!(backend = %store.kind(), "Remote store configured");
    Ok(store)
}

/// Local JSON files used when a network backend cannot be reached
pub fn build_local_fallback(config: &Config, categories: &CategoryRegistry) -> Option<Arc<dyn ProductStore>> {
    if !config.local_fallback || config.backend == BackendKind::Local {
        return None;
    }
    Some(Arc::new(LocalJsonStore::new(&config.products_dir, categories.clone())))
}
