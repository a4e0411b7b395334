// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::models::{validate_catalog, Product};
use crate::error::SyncError;

pub const EXPORT_VERSION: &str = "1.0";

/// Export/import document exchanged with the user as a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogExport {
    pub products: Vec<Product>,
    pub export_date: DateTime<Utc>,
    pub total_products: usize,
    pub version: String,
}

impl CatalogExport {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            total_products: products.len(),
            products,
            export_date: Utc::now(),
            version: EXPORT_VERSION.to_string(),
        }
    }

    /// Parse and validate an import file. Nothing is mutated on failure.
    pub fn parse(raw: &[u8]) -> Result<Self, SyncError> {
        let document: CatalogExport = serde_json::from_slice(raw)
            .map_err(|e| SyncError::InvalidInput(format!("Malformed import file: {}", e)))?;

        validate_catalog(&document.products).map_err(SyncError::InvalidInput)?;

        if document.total_products != document.products.len() {
            warn!(
                declared = document.total_products,
                actual = document.products.len(),
                "Import file product count does not match its header"
            );
        }

        Ok(document)
    }
}
