// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::cache::SourceTag;
use crate::catalog::{Product, ProductId};
use crate::view::FilterState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Offline,
    Syncing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Offline => "offline",
            ConnectionState::Syncing => "syncing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Transient message shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub level: StatusLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl SyncStatus {
    pub fn new(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Error, message)
    }
}

/// Everything the coordinator owns for the running session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub products: Vec<Product>,
    pub connection: ConnectionState,
    pub source: SourceTag,
    pub status: Option<SyncStatus>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub filter: FilterState,
}

/// Read-only view of the session for the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub source: SourceTag,
    pub status: Option<SyncStatus>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub product_count: usize,
    pub pending_count: usize,
}

/// Outcome of a stock mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockUpdate {
    pub id: ProductId,
    pub stock: u32,

    /// False when the write sits in the pending queue
    pub synced: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub sync_id: Uuid,

    /// Another pass was already running; nothing was done
    pub skipped: bool,

    pub replayed: usize,
    pub remaining: usize,
    pub refreshed: bool,
    pub state: ConnectionState,
}

/// Pushed to subscribers whenever the session changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    ProductsChanged {
        count: usize,
        source: SourceTag,
    },
    StatusChanged {
        state: ConnectionState,
        status: Option<SyncStatus>,
    },
}
