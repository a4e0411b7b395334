// SPDX-License-Identifier: GPL-3.0-only
pub mod models;
pub mod product_cache;
pub mod sqlite;
pub mod traits;

pub use models::{now_millis, CacheEnvelope, PendingChange, SourceTag};
pub use product_cache::ProductCache;
pub use sqlite::SqliteKvStore;
