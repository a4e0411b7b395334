// SPDX-License-Identifier: GPL-3.0-only
pub mod categories;
pub mod models;
pub mod transfer;

pub use categories::{Category, CategoryRegistry};
pub use models::{find_duplicate_id, Product, ProductId};
pub use transfer::CatalogExport;
