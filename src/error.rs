// SPDX-License-Identifier: GPL-3.0-only
use crate::catalog::ProductId;

/// Outcomes the sync layer surfaces to callers. None of them end the session.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote store rejected write: {0}")]
    RemoteWriteRejected(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cache data is corrupt: {0}")]
    CacheCorrupt(String),

    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
