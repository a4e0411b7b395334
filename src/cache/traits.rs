// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Overwrite the value stored under `key`
    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Remove `key`; missing keys are not an error
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}
