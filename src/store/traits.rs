// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::{find_duplicate_id, Product, ProductId};

/// Which remote store implementation is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sheets,
    Firestore,
    #[default]
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Sheets => "sheets",
            BackendKind::Firestore => "firestore",
            BackendKind::Local => "local",
        };
        f.write_str(s)
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sheets" | "google-sheets" => Ok(BackendKind::Sheets),
            "firestore" | "firebase" => Ok(BackendKind::Firestore),
            "local" | "json" => Ok(BackendKind::Local),
            other => Err(anyhow::anyhow!("Unknown backend: {}", other)),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    Status(reqwest::StatusCode),

    #[error("Remote store rejected request: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store is read-only")]
    ReadOnly,
}

/// Remote product store.
///
/// Write operations report plain success: callers decide between queueing
/// and rejecting, so implementations log the failure cause themselves.
#[async_trait]
pub trait ProductStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn is_read_only(&self) -> bool {
        false
    }

    /// Cheap reachability check. Never errors.
    async fn probe(&self) -> bool;

    /// Full product list. Partial data is never returned.
    async fn fetch_all(&self) -> Result<Vec<Product>, StoreError>;

    /// Set a product's stock to an absolute value
    async fn update_stock(&self, id: &ProductId, new_stock: u32) -> bool;

    /// Create or overwrite a product
    async fn save_product(&self, product: &Product) -> bool;

    async fn delete_product(&self, id: &ProductId) -> bool;

    /// Replace the whole collection. All-or-nothing.
    async fn bulk_replace(&self, products: &[Product]) -> bool;
}

/// Fail a fetch whose result names the same product twice
pub fn ensure_unique_ids(products: &[Product]) -> Result<(), StoreError> {
    match find_duplicate_id(products) {
        Some(id) => Err(StoreError::Malformed(format!("duplicate product id {}", id))),
        None => Ok(()),
    }
}
