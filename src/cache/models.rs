// SPDX-License-Identifier: GPL-3.0-only
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{Product, ProductId};

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Where the session's product list came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Remote,
    Cache,
    Local,
    #[default]
    Empty,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceTag::Remote => "remote",
            SourceTag::Cache => "cache",
            SourceTag::Local => "local",
            SourceTag::Empty => "empty",
        };
        f.write_str(s)
    }
}

/// Persisted snapshot of the product list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope {
    pub products: Vec<Product>,

    /// Epoch milliseconds of the last remote read
    pub timestamp: i64,

    pub source_tag: SourceTag,
}

impl CacheEnvelope {
    pub fn new(products: Vec<Product>, source_tag: SourceTag) -> Self {
        Self {
            products,
            timestamp: now_millis(),
            source_tag,
        }
    }
}

/// A stock write that has not reached the remote store yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub product_id: ProductId,

    /// Absolute stock value, so replaying twice converges
    pub new_stock: u32,

    /// Client-side epoch milliseconds
    pub timestamp: i64,
}

impl PendingChange {
    pub fn new(product_id: ProductId, new_stock: u32) -> Self {
        Self {
            product_id,
            new_stock,
            timestamp: now_millis(),
        }
    }
}
