// SPDX-License-Identifier: GPL-3.0-only
use serde::Serialize;
use std::collections::HashSet;

use crate::catalog::Product;
use crate::view::filters::LOW_STOCK_MAX;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStats {
    pub count: usize,
    pub total_units: u64,
    pub available_count: usize,
    pub low_stock_count: usize,
    pub distinct_categories: usize,
}

pub fn compute_stats(products: &[Product]) -> InventoryStats {
    let categories: HashSet<&str> = products.iter().map(|p| p.category.as_str()).collect();

    InventoryStats {
        count: products.len(),
        total_units: products.iter().map(|p| u64::from(p.stock)).sum(),
        available_count: products.iter().filter(|p| p.stock > 0).count(),
        low_stock_count: products.iter().filter(|p| p.stock <= LOW_STOCK_MAX).count(),
        distinct_categories: categories.len(),
    }
}
