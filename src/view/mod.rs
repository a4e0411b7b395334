// SPDX-License-Identifier: GPL-3.0-only
pub mod filters;
pub mod stats;

use serde::Serialize;

use crate::catalog::Product;

pub use filters::{apply_filters, FilterState, StockBand};
pub use stats::{compute_stats, InventoryStats};

/// What the UI renders: the filtered list plus counters over it.
#[derive(Debug, Clone, Serialize)]
pub struct ViewModel {
    pub filter: FilterState,
    pub products: Vec<Product>,
    pub stats: InventoryStats,
}

impl ViewModel {
    pub fn build(products: &[Product], filter: &FilterState) -> Self {
        let filtered = apply_filters(products, filter);
        let stats = compute_stats(&filtered);
        Self {
            filter: filter.clone(),
            products: filtered,
            stats,
        }
    }
}
