// SPDX-License-Identifier: GPL-3.0-only
use serde::{Deserialize, Serialize};

use crate::catalog::Product;

/// Category value that disables the category predicate
pub const ALL_CATEGORIES: &str = "todas";

/// Highest stock counted as low
pub const LOW_STOCK_MAX: u32 = 5;

/// Highest stock counted as medium
pub const MEDIUM_STOCK_MAX: u32 = 15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockBand {
    #[default]
    All,
    Low,
    Medium,
    High,
}

impl StockBand {
    pub fn contains(self, stock: u32) -> bool {
        match self {
            StockBand::All => true,
            StockBand::Low => stock <= LOW_STOCK_MAX,
            StockBand::Medium => stock > LOW_STOCK_MAX && stock <= MEDIUM_STOCK_MAX,
            StockBand::High => stock > MEDIUM_STOCK_MAX,
        }
    }
}

/// User-selected filters, persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    pub search: String,
    pub category: String,
    pub stock_band: StockBand,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search: String::new(),
            category: ALL_CATEGORIES.to_string(),
            stock_band: StockBand::All,
        }
    }
}

impl FilterState {
    pub fn matches(&self, product: &Product) -> bool {
        self.matches_search(product)
            && (self.category == ALL_CATEGORIES || self.category == product.category)
            && self.stock_band.contains(product.stock)
    }

    fn matches_search(&self, product: &Product) -> bool {
        let term = self.search.to_lowercase();
        term.is_empty()
            || product.name.to_lowercase().contains(&term)
            || product.description.to_lowercase().contains(&term)
    }
}

/// Products passing every filter, in their original order
pub fn apply_filters(products: &[Product], filter: &FilterState) -> Vec<Product> {
    products.iter().filter(|p| filter.matches(p)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Product> {
        let mut tape = Product::new("1", "Cinta Aislante", "Cintas", 3);
        tape.description = "Cinta negra de PVC".to_string();
        vec![
            tape,
            Product::new("2", "Tubo PVC 20mm", "PVC", 10),
            Product::new("3", "Cable unipolar", "Cables", 40),
            Product::new("4", "Abrazadera", "Abrazaderas", 5),
            Product::new("5", "Soporte", "Soportes", 16),
            Product::new("6", "Varilla roscada", "Varillas", 0),
        ]
    }

    fn ids(products: &[Product]) -> Vec<&str> {
        products.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_default_filter_returns_everything_in_order() {
        let products = catalog();
        let filtered = apply_filters(&products, &FilterState::default());
        assert_eq!(filtered, products);
    }

    #[test]
    fn test_search_matches_name_or_description_case_insensitive() {
        let filter = FilterState {
            search: "pvc".to_string(),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&catalog(), &filter)), vec!["1", "2"]);
    }

    #[test]
    fn test_whitespace_search_is_a_literal_term() {
        let filter = FilterState {
            search: " ".to_string(),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&catalog(), &filter)), vec!["1", "2", "3", "6"]);
    }

    #[test]
    fn test_category_filter() {
        let filter = FilterState {
            category: "Cables".to_string(),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&catalog(), &filter)), vec!["3"]);
    }

    #[test]
    fn test_stock_band_boundaries() {
        assert!(StockBand::Low.contains(0));
        assert!(StockBand::Low.contains(5));
        assert!(!StockBand::Low.contains(6));
        assert!(StockBand::Medium.contains(6));
        assert!(StockBand::Medium.contains(15));
        assert!(!StockBand::Medium.contains(5));
        assert!(StockBand::High.contains(16));
        assert!(!StockBand::High.contains(15));
    }

    #[test]
    fn test_filters_combine() {
        let filter = FilterState {
            search: "a".to_string(),
            category: ALL_CATEGORIES.to_string(),
            stock_band: StockBand::Low,
        };
        assert_eq!(ids(&apply_filters(&catalog(), &filter)), vec!["1", "4", "6"]);
    }

    #[test]
    fn test_filter_state_wire_format() {
        let state: FilterState = serde_json::from_str(r#"{"search":"x","stockBand":"high"}"#).unwrap();
        assert_eq!(state.category, ALL_CATEGORIES);
        assert_eq!(state.stock_band, StockBand::High);

        let json = serde_json::to_string(&FilterState::default()).unwrap();
        assert_eq!(json, r#"{"search":"","category":"todas","stockBand":"all"}"#);
    }
}
