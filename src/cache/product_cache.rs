// SPDX-License-Identifier: GPL-3.0-only
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::models::{now_millis, CacheEnvelope, PendingChange, SourceTag};
use crate::cache::traits::KeyValueStore;
use crate::catalog::{Product, ProductId};
use crate::error::SyncError;
use crate::view::FilterState;

pub const PRODUCTS_CACHE_KEY: &str = "products_cache";
pub const PENDING_CHANGES_KEY: &str = "pending_changes";
pub const FILTER_STATE_KEY: &str = "stockmaster_state";

/// Best-effort local mirror of the session: product envelope, pending queue
/// and filter state.
///
/// Read-modify-write operations hold `write_lock` so a patch and an enqueue
/// racing each other cannot drop one another's update.
#[derive(Clone)]
pub struct ProductCache {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl ProductCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SyncError> {
        let raw = self
            .store
            .get(key)
            .await
            .map_err(|e| SyncError::CacheCorrupt(format!("{}: read failed: {}", key, e)))?;

        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SyncError::CacheCorrupt(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_string(value)?;
        self.store.put(key, &payload).await
    }

    /// Last stored envelope. Corrupt data counts as a miss.
    pub async fn load(&self) -> Option<CacheEnvelope> {
        match self.read_json(PRODUCTS_CACHE_KEY).await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable product cache");
                None
            }
        }
    }

    pub async fn store(&self, envelope: &CacheEnvelope) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(PRODUCTS_CACHE_KEY, envelope).await?;
        debug!(count = envelope.products.len(), source = %envelope.source_tag, "Stored product cache");
        Ok(())
    }

    pub fn is_fresh(envelope: &CacheEnvelope, max_age: Duration) -> bool {
        Self::is_fresh_at(envelope, max_age, now_millis())
    }

    /// A timestamp ahead of `now_ms` comes from a skewed clock and is stale.
    pub fn is_fresh_at(envelope: &CacheEnvelope, max_age: Duration, now_ms: i64) -> bool {
        if envelope.timestamp > now_ms {
            return false;
        }
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(envelope.timestamp) < max_age_ms
    }

    /// Set one product's stock inside the stored envelope, leaving order,
    /// other entries and the envelope timestamp untouched.
    ///
    /// Returns false when there is no envelope or the product is not in it.
    pub async fn patch_stock(&self, id: &ProductId, new_stock: u32) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;

        let Some(mut envelope) = self.load().await else {
            return Ok(false);
        };
        let Some(product) = envelope.products.iter_mut().find(|p| &p.id == id) else {
            return Ok(false);
        };

        product.stock = new_stock;
        self.write_json(PRODUCTS_CACHE_KEY, &envelope).await?;
        Ok(true)
    }

    /// Replace the cached list after a local upsert or delete. The previous
    /// timestamp is kept so staleness still tracks the last remote read.
    pub async fn replace_products(&self, products: &[Product], source_tag: SourceTag) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        let timestamp = self.load().await.map(|e| e.timestamp).unwrap_or_else(now_millis);
        let envelope = CacheEnvelope {
            products: products.to_vec(),
            timestamp,
            source_tag,
        };
        self.write_json(PRODUCTS_CACHE_KEY, &envelope).await
    }

    async fn read_pending(&self) -> Vec<PendingChange> {
        match self.read_json::<Vec<PendingChange>>(PENDING_CHANGES_KEY).await {
            Ok(queue) => queue.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable pending-change queue");
                Vec::new()
            }
        }
    }

    /// Queue a stock write, keeping at most one entry per product. The newer
    /// entry wins and moves to the back of the queue.
    pub async fn enqueue_pending(&self, change: PendingChange) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut queue = self.read_pending().await;
        if let Some(pos) = queue.iter().position(|c| c.product_id == change.product_id) {
            if queue[pos].timestamp > change.timestamp {
                debug!(product_id = %change.product_id, "Dropping pending change older than queued one");
                return Ok(());
            }
            queue.remove(pos);
        }

        info!(product_id = %change.product_id, new_stock = change.new_stock, "Queued pending stock change");
        queue.push(change);
        self.write_json(PENDING_CHANGES_KEY, &queue).await
    }

    /// Queue contents, oldest first
    pub async fn pending(&self) -> Vec<PendingChange> {
        let mut queue = self.read_pending().await;
        queue.sort_by_key(|c| c.timestamp);
        queue
    }

    /// Entries to replay, oldest first. The queue itself is untouched: each
    /// entry leaves it only through `acknowledge` once its replay succeeded,
    /// so an aborted drain loses nothing.
    pub async fn drain_pending(&self) -> Vec<PendingChange> {
        self.pending().await
    }

    /// Drop a replayed entry unless a newer change for the same product was
    /// queued while it was in flight.
    pub async fn acknowledge(&self, change: &PendingChange) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;

        let mut queue = self.read_pending().await;
        let before = queue.len();
        queue.retain(|c| !(c.product_id == change.product_id && c.timestamp <= change.timestamp));

        if queue.len() == before {
            return Ok(false);
        }
        self.write_json(PENDING_CHANGES_KEY, &queue).await?;
        Ok(true)
    }

    /// Forget any queued write for a product that no longer exists
    pub async fn discard_pending(&self, id: &ProductId) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut queue = self.read_pending().await;
        let before = queue.len();
        queue.retain(|c| &c.product_id != id);
        if queue.len() != before {
            self.write_json(PENDING_CHANGES_KEY, &queue).await?;
        }
        Ok(())
    }

    pub async fn clear_pending(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(PENDING_CHANGES_KEY).await
    }

    pub async fn load_filter_state(&self) -> FilterState {
        match self.read_json(FILTER_STATE_KEY).await {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable filter state");
                FilterState::default()
            }
        }
    }

    pub async fn save_filter_state(&self, state: &FilterState) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(FILTER_STATE_KEY, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers;
    use crate::view::StockBand;

    fn change(id: &str, stock: u32, timestamp: i64) -> PendingChange {
        PendingChange {
            product_id: ProductId::from(id),
            new_stock: stock,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_load_empty_cache() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        assert!(cache.load().await.is_none());
        assert!(cache.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        let envelope = CacheEnvelope::new(test_helpers::sample_products(), SourceTag::Remote);

        cache.store(&envelope).await.unwrap();
        assert_eq!(cache.load().await, Some(envelope));
    }

    #[tokio::test]
    async fn test_corrupt_envelope_is_a_miss() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        cache.store.put(PRODUCTS_CACHE_KEY, "{ definitely not json").await.unwrap();

        assert!(cache.load().await.is_none());
        let err = cache.read_json::<CacheEnvelope>(PRODUCTS_CACHE_KEY).await.unwrap_err();
        assert!(matches!(err, SyncError::CacheCorrupt(_)));
    }

    #[test]
    fn test_is_fresh_at() {
        let envelope = CacheEnvelope {
            products: Vec::new(),
            timestamp: 1_000_000,
            source_tag: SourceTag::Remote,
        };
        let hour = Duration::from_secs(3600);

        assert!(ProductCache::is_fresh_at(&envelope, hour, 1_000_000 + 3_599_999));
        assert!(!ProductCache::is_fresh_at(&envelope, hour, 1_000_000 + 3_600_000));
        assert!(!ProductCache::is_fresh_at(&envelope, hour, 1_000_000 + 86_400_000));
        assert!(ProductCache::is_fresh_at(&envelope, hour, 1_000_000));
        assert!(!ProductCache::is_fresh_at(&envelope, hour, 999_999));
    }

    #[tokio::test]
    async fn test_patch_stock_keeps_order_and_timestamp() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        let envelope = CacheEnvelope {
            products: test_helpers::sample_products(),
            timestamp: 42,
            source_tag: SourceTag::Remote,
        };
        cache.store(&envelope).await.unwrap();

        assert!(cache.patch_stock(&ProductId::from("2"), 99).await.unwrap());

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.timestamp, 42);
        let ids: Vec<&str> = loaded.products.iter().map(|p| p.id.as_str()).collect();
        let expected: Vec<&str> = envelope.products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, expected);
        assert_eq!(loaded.products[1].stock, 99);
        assert_eq!(loaded.products[0], envelope.products[0]);
    }

    #[tokio::test]
    async fn test_patch_stock_unknown_product() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        assert!(!cache.patch_stock(&ProductId::from("1"), 3).await.unwrap());

        cache
            .store(&CacheEnvelope::new(test_helpers::sample_products(), SourceTag::Remote))
            .await
            .unwrap();
        assert!(!cache.patch_stock(&ProductId::from("missing"), 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_products_keeps_timestamp() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        cache
            .store(&CacheEnvelope {
                products: Vec::new(),
                timestamp: 7,
                source_tag: SourceTag::Remote,
            })
            .await
            .unwrap();

        cache
            .replace_products(&test_helpers::sample_products(), SourceTag::Remote)
            .await
            .unwrap();

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.timestamp, 7);
        assert_eq!(loaded.products, test_helpers::sample_products());
    }

    #[tokio::test]
    async fn test_enqueue_collapses_same_product() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;

        cache.enqueue_pending(change("1", 8, 100)).await.unwrap();
        cache.enqueue_pending(change("1", 6, 200)).await.unwrap();

        assert_eq!(cache.pending().await, vec![change("1", 6, 200)]);
    }

    #[tokio::test]
    async fn test_enqueue_keeps_newer_existing_entry() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;

        cache.enqueue_pending(change("1", 6, 200)).await.unwrap();
        cache.enqueue_pending(change("1", 8, 100)).await.unwrap();

        assert_eq!(cache.pending().await, vec![change("1", 6, 200)]);
    }

    #[tokio::test]
    async fn test_drain_is_oldest_first_and_non_destructive() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;

        cache.enqueue_pending(change("1", 1, 300)).await.unwrap();
        cache.enqueue_pending(change("2", 2, 100)).await.unwrap();
        cache.enqueue_pending(change("3", 3, 200)).await.unwrap();

        let drained = cache.drain_pending().await;
        let order: Vec<&str> = drained.iter().map(|c| c.product_id.as_str()).collect();
        assert_eq!(order, vec!["2", "3", "1"]);
        assert_eq!(cache.pending().await.len(), 3);
    }

    #[tokio::test]
    async fn test_acknowledge_removes_only_replayed_entry() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        cache.enqueue_pending(change("1", 8, 100)).await.unwrap();
        cache.enqueue_pending(change("2", 4, 150)).await.unwrap();

        assert!(cache.acknowledge(&change("1", 8, 100)).await.unwrap());
        assert_eq!(cache.pending().await, vec![change("2", 4, 150)]);

        // Second acknowledgement is a no-op
        assert!(!cache.acknowledge(&change("1", 8, 100)).await.unwrap());
    }

    #[tokio::test]
    async fn test_acknowledge_keeps_superseding_entry() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        cache.enqueue_pending(change("1", 8, 100)).await.unwrap();
        let in_flight = cache.drain_pending().await.remove(0);

        cache.enqueue_pending(change("1", 6, 200)).await.unwrap();

        assert!(!cache.acknowledge(&in_flight).await.unwrap());
        assert_eq!(cache.pending().await, vec![change("1", 6, 200)]);
    }

    #[tokio::test]
    async fn test_discard_and_clear_pending() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        cache.enqueue_pending(change("1", 8, 100)).await.unwrap();
        cache.enqueue_pending(change("2", 4, 150)).await.unwrap();

        cache.discard_pending(&ProductId::from("1")).await.unwrap();
        assert_eq!(cache.pending().await, vec![change("2", 4, 150)]);

        cache.clear_pending().await.unwrap();
        assert!(cache.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_pending_queue_is_empty() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        cache.store.put(PENDING_CHANGES_KEY, "[{\"bad\":").await.unwrap();

        assert!(cache.pending().await.is_empty());
        cache.enqueue_pending(change("1", 2, 1)).await.unwrap();
        assert_eq!(cache.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_state_round_trip() {
        let (cache, _dir) = test_helpers::setup_test_cache().await;
        assert_eq!(cache.load_filter_state().await, FilterState::default());

        let state = FilterState {
            search: "cinta".to_string(),
            category: "Cintas".to_string(),
            stock_band: StockBand::Medium,
        };
        cache.save_filter_state(&state).await.unwrap();
        assert_eq!(cache.load_filter_state().await, state);
    }
}
