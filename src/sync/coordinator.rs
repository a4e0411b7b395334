// SPDX-License-Identifier: GPL-3.0-only
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheEnvelope, PendingChange, ProductCache, SourceTag};
use crate::catalog::{find_duplicate_id, CatalogExport, Product, ProductId};
use crate::error::SyncError;
use crate::store::{BackendKind, ProductStore};
use crate::sync::state::{
    ConnectionState, SessionSnapshot, SessionState, StockUpdate, SyncEvent, SyncReport, SyncStatus,
};
use crate::view::{FilterState, ViewModel};
use crate::watcher::WatchEvent;

const EVENT_CAPACITY: usize = 64;

/// Apply queued stock writes on top of a freshly loaded list, oldest first.
/// Entries for products missing from the list are left alone.
pub fn overlay_pending(mut products: Vec<Product>, pending: &[PendingChange]) -> Vec<Product> {
    for change in pending {
        if let Some(product) = products.iter_mut().find(|p| p.id == change.product_id) {
            product.stock = change.new_stock;
        }
    }
    products
}

/// Owns the session: loads products, applies edits optimistically and keeps
/// the remote store, the cache and the pending queue converging.
pub struct SyncCoordinator {
    remote: Arc<dyn ProductStore>,
    fallback: Option<Arc<dyn ProductStore>>,
    cache: ProductCache,
    cache_max_age: Duration,
    state: RwLock<SessionState>,
    sync_guard: Mutex<()>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    pub fn new(
        remote: Arc<dyn ProductStore>,
        fallback: Option<Arc<dyn ProductStore>>,
        cache: ProductCache,
        cache_max_age: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            remote,
            fallback,
            cache,
            cache_max_age,
            state: RwLock::new(SessionState::default()),
            sync_guard: Mutex::new(()),
            events,
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.remote.kind()
    }

    pub fn is_read_only(&self) -> bool {
        self.remote.is_read_only()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Move to `connection`. A `None` status keeps the current message.
    async fn set_connection(&self, connection: ConnectionState, status: Option<SyncStatus>) {
        let status = {
            let mut state = self.state.write().await;
            state.connection = connection;
            if status.is_some() {
                state.status = status;
            }
            state.status.clone()
        };
        debug!(state = %connection, "Connection state changed");
        self.emit(SyncEvent::StatusChanged {
            state: connection,
            status,
        });
    }

    async fn set_status(&self, status: SyncStatus) {
        let connection = {
            let mut state = self.state.write().await;
            state.status = Some(status.clone());
            state.connection
        };
        self.emit(SyncEvent::StatusChanged {
            state: connection,
            status: Some(status),
        });
    }

    async fn replace_session_products(&self, products: Vec<Product>, source: SourceTag, from_remote: bool) {
        let count = products.len();
        {
            let mut state = self.state.write().await;
            state.products = products;
            state.source = source;
            if from_remote {
                state.last_synced_at = Some(Utc::now());
            }
        }
        self.emit(SyncEvent::ProductsChanged { count, source });
    }

    async fn with_pending_overlay(&self, products: Vec<Product>) -> Vec<Product> {
        let pending = self.cache.pending().await;
        if !pending.is_empty() {
            debug!(pending = pending.len(), "Overlaying queued stock changes");
        }
        overlay_pending(products, &pending)
    }

    /// Adopt a list read from the remote store as the session's truth
    async fn accept_remote(&self, products: Vec<Product>) {
        let products = self.with_pending_overlay(products).await;

        let envelope = CacheEnvelope::new(products.clone(), SourceTag::Remote);
        if let Err(e) = self.cache.store(&envelope).await {
            warn!(error = %e, "Failed to write product cache");
        }

        self.replace_session_products(products, SourceTag::Remote, true).await;
    }

    /// Initial load: remote if reachable, otherwise the offline fallback chain.
    pub async fn start(&self) -> ConnectionState {
        let filter = self.cache.load_filter_state().await;
        self.state.write().await.filter = filter;

        self.set_connection(ConnectionState::Connecting, None).await;
        info!(backend = %self.remote.kind(), "Connecting to remote store");

        if self.remote.probe().await {
            match self.remote.fetch_all().await {
                Ok(products) => {
                    let count = products.len();
                    self.accept_remote(products).await;
                    self.set_connection(
                        ConnectionState::Connected,
                        Some(SyncStatus::info(format!("Connected to {}", self.remote.kind()))),
                    )
                    .await;
                    info!(count, backend = %self.remote.kind(), "Loaded products from remote store");
                    return ConnectionState::Connected;
                }
                Err(e) => {
                    warn!(error = %e, backend = %self.remote.kind(), "Initial fetch failed");
                }
            }
        } else {
            warn!(backend = %self.remote.kind(), "Remote store unreachable");
        }

        self.load_offline().await;
        ConnectionState::Offline
    }

    async fn load_offline(&self) {
        if let Some(envelope) = self.cache.load().await {
            if ProductCache::is_fresh(&envelope, self.cache_max_age) {
                let products = self.with_pending_overlay(envelope.products).await;
                info!(count = products.len(), "Working offline from cache");
                self.replace_session_products(products, SourceTag::Cache, false).await;
                self.set_connection(
                    ConnectionState::Offline,
                    Some(SyncStatus::warning("Working offline with cached data")),
                )
                .await;
                return;
            }
            debug!(timestamp = envelope.timestamp, "Cached product list is stale");
        }

        if let Some(fallback) = &self.fallback {
            match fallback.fetch_all().await {
                Ok(products) => {
                    let products = self.with_pending_overlay(products).await;
                    info!(count = products.len(), "Working offline from local product files");
                    self.replace_session_products(products, SourceTag::Local, false).await;
                    self.set_connection(
                        ConnectionState::Offline,
                        Some(SyncStatus::warning("Remote store unavailable, using local product files")),
                    )
                    .await;
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Local product files unavailable");
                }
            }
        }

        self.replace_session_products(Vec::new(), SourceTag::Empty, false).await;
        self.set_connection(
            ConnectionState::Offline,
            Some(SyncStatus::error("No product data available")),
        )
        .await;
    }

    /// Add `delta` to a product's stock
    pub async fn adjust_stock(&self, id: &ProductId, delta: i64) -> Result<StockUpdate, SyncError> {
        let new_stock = {
            let mut state = self.state.write().await;
            let product = state
                .products
                .iter_mut()
                .find(|p| &p.id == id)
                .ok_or_else(|| SyncError::NotFound(id.clone()))?;

            let target = i64::from(product.stock)
                .checked_add(delta)
                .ok_or_else(|| SyncError::InvalidInput(format!("Stock change {} is out of range", delta)))?;
            if target < 0 {
                return Err(SyncError::InvalidInput(format!(
                    "Stock for {} cannot go below zero ({} {:+})",
                    id, product.stock, delta
                )));
            }
            let new_stock = u32::try_from(target)
                .map_err(|_| SyncError::InvalidInput(format!("Stock {} is out of range", target)))?;

            product.stock = new_stock;
            new_stock
        };

        self.commit_stock(id, new_stock).await
    }

    /// Set a product's stock to an absolute value
    pub async fn set_stock(&self, id: &ProductId, stock: u32) -> Result<StockUpdate, SyncError> {
        {
            let mut state = self.state.write().await;
            let product = state
                .products
                .iter_mut()
                .find(|p| &p.id == id)
                .ok_or_else(|| SyncError::NotFound(id.clone()))?;
            product.stock = stock;
        }

        self.commit_stock(id, stock).await
    }

    /// Persist an already-applied stock value: cache first, then remote,
    /// queueing it when the remote write is not acknowledged.
    async fn commit_stock(&self, id: &ProductId, stock: u32) -> Result<StockUpdate, SyncError> {
        let (count, source) = {
            let state = self.state.read().await;
            (state.products.len(), state.source)
        };
        self.emit(SyncEvent::ProductsChanged { count, source });

        match self.cache.patch_stock(id, stock).await {
            Ok(true) => {}
            Ok(false) => debug!(product_id = %id, "No cached envelope to patch"),
            Err(e) => warn!(product_id = %id, error = %e, "Failed to patch product cache"),
        }

        let change = PendingChange::new(id.clone(), stock);

        if self.remote.update_stock(id, stock).await {
            // An older queued value must not overwrite this one on replay
            if let Err(e) = self.cache.acknowledge(&change).await {
                warn!(product_id = %id, error = %e, "Failed to clear superseded pending change");
            }
            info!(product_id = %id, stock, "Stock updated remotely");
            return Ok(StockUpdate {
                id: id.clone(),
                stock,
                synced: true,
            });
        }

        if let Err(e) = self.cache.enqueue_pending(change).await {
            error!(product_id = %id, error = %e, "Failed to queue pending stock change");
            self.set_status(SyncStatus::error("Stock changed locally but could not be queued"))
                .await;
        } else {
            self.set_status(SyncStatus::warning("Saved locally, will sync when the connection returns"))
                .await;
        }

        Ok(StockUpdate {
            id: id.clone(),
            stock,
            synced: false,
        })
    }

    /// Replay queued writes and reconcile with the remote list.
    ///
    /// Only one pass runs at a time; a concurrent trigger returns a skipped
    /// report immediately.
    pub async fn sync_now(&self) -> SyncReport {
        let sync_id = Uuid::new_v4();

        let Ok(_guard) = self.sync_guard.try_lock() else {
            debug!(%sync_id, "Sync already running, skipping");
            return SyncReport {
                sync_id,
                skipped: true,
                replayed: 0,
                remaining: self.cache.pending().await.len(),
                refreshed: false,
                state: self.connection().await,
            };
        };

        if !self.remote.probe().await {
            let remaining = self.cache.pending().await.len();
            info!(%sync_id, remaining, "Remote store unreachable, staying offline");
            self.set_connection(
                ConnectionState::Offline,
                Some(SyncStatus::warning("Working offline, changes stay queued")),
            )
            .await;
            return SyncReport {
                sync_id,
                skipped: false,
                replayed: 0,
                remaining,
                refreshed: false,
                state: ConnectionState::Offline,
            };
        }

        self.set_connection(ConnectionState::Syncing, None).await;
        let replayed = self.replay_pending(sync_id).await;

        let refreshed = match self.remote.fetch_all().await {
            Ok(products) => {
                self.discard_orphaned_pending(&products).await;
                self.accept_remote(products).await;
                true
            }
            Err(e) => {
                warn!(%sync_id, error = %e, "Refetch after sync failed");
                false
            }
        };

        let remaining = self.cache.pending().await.len();
        let (state, status) = match (refreshed, remaining) {
            (true, 0) => (ConnectionState::Connected, SyncStatus::info("Synchronized")),
            (true, n) => (
                ConnectionState::Connected,
                SyncStatus::warning(format!("{} change(s) still pending", n)),
            ),
            (false, _) => (
                ConnectionState::Offline,
                SyncStatus::warning("Sync failed, working offline"),
            ),
        };
        self.set_connection(state, Some(status)).await;

        info!(%sync_id, replayed, remaining, refreshed, state = %state, "Sync pass finished");
        SyncReport {
            sync_id,
            skipped: false,
            replayed,
            remaining,
            refreshed,
            state,
        }
    }

    /// Replay oldest first, stopping at the first refusal
    async fn replay_pending(&self, sync_id: Uuid) -> usize {
        if self.remote.is_read_only() {
            debug!(%sync_id, "Remote store is read-only, keeping pending changes");
            return 0;
        }

        let mut replayed = 0;
        for change in self.cache.drain_pending().await {
            if !self.remote.update_stock(&change.product_id, change.new_stock).await {
                warn!(
                    %sync_id,
                    product_id = %change.product_id,
                    "Replay refused, leaving remaining changes queued"
                );
                break;
            }

            if let Err(e) = self.cache.acknowledge(&change).await {
                warn!(%sync_id, product_id = %change.product_id, error = %e, "Failed to acknowledge replayed change");
            }
            debug!(%sync_id, product_id = %change.product_id, stock = change.new_stock, "Replayed pending change");
            replayed += 1;
        }
        replayed
    }

    /// Queued writes for products the remote no longer has can never
    /// succeed and would block the queue forever.
    async fn discard_orphaned_pending(&self, remote_products: &[Product]) {
        let known: HashSet<&ProductId> = remote_products.iter().map(|p| &p.id).collect();
        for change in self.cache.pending().await {
            if known.contains(&change.product_id) {
                continue;
            }
            warn!(product_id = %change.product_id, "Dropping pending change for product missing remotely");
            if let Err(e) = self.cache.discard_pending(&change.product_id).await {
                warn!(product_id = %change.product_id, error = %e, "Failed to drop orphaned pending change");
            }
        }
    }

    /// Re-read the remote list outside the sync cycle
    pub async fn refresh(&self) -> Result<usize, SyncError> {
        let products = self
            .remote
            .fetch_all()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        let count = products.len();
        self.accept_remote(products).await;

        if self.connection().await != ConnectionState::Syncing {
            self.set_connection(ConnectionState::Connected, None).await;
        }
        Ok(count)
    }

    /// Adopt a list pushed by a change watcher. Last writer wins.
    pub async fn apply_remote_snapshot(&self, products: Vec<Product>) -> Result<usize, SyncError> {
        if let Some(id) = find_duplicate_id(&products) {
            return Err(SyncError::InvalidInput(format!("Snapshot repeats product id {}", id)));
        }
        let count = products.len();
        self.accept_remote(products).await;
        Ok(count)
    }

    pub async fn handle_watch_event(&self, event: WatchEvent) {
        let result = match event {
            WatchEvent::Changed(path) => {
                debug!(path = %path.display(), "Product source changed, refreshing");
                self.refresh().await
            }
            WatchEvent::Snapshot(products) => self.apply_remote_snapshot(products).await,
        };

        match result {
            Ok(count) => debug!(count, "Applied remote change"),
            Err(e) => warn!(error = %e, "Failed to apply remote change"),
        }
    }

    /// Create or overwrite a product. Applied locally only once the remote
    /// store accepts it.
    pub async fn save_product(&self, product: Product) -> Result<Product, SyncError> {
        product.validate().map_err(SyncError::InvalidInput)?;

        if !self.remote.save_product(&product).await {
            return Err(SyncError::RemoteWriteRejected(format!(
                "{} store did not accept product {}",
                self.remote.kind(),
                product.id
            )));
        }

        let (products, source) = {
            let mut state = self.state.write().await;
            match state.products.iter_mut().find(|p| p.id == product.id) {
                Some(existing) => *existing = product.clone(),
                None => state.products.push(product.clone()),
            }
            (state.products.clone(), state.source)
        };

        self.persist_local_edit(&product.id, &products, source).await;
        info!(product_id = %product.id, "Saved product");
        Ok(product)
    }

    pub async fn delete_product(&self, id: &ProductId) -> Result<(), SyncError> {
        if self.product(id).await.is_err() {
            return Err(SyncError::NotFound(id.clone()));
        }

        if !self.remote.delete_product(id).await {
            return Err(SyncError::RemoteWriteRejected(format!(
                "{} store did not delete product {}",
                self.remote.kind(),
                id
            )));
        }

        let (products, source) = {
            let mut state = self.state.write().await;
            state.products.retain(|p| &p.id != id);
            (state.products.clone(), state.source)
        };

        self.persist_local_edit(id, &products, source).await;
        info!(product_id = %id, "Deleted product");
        Ok(())
    }

    async fn persist_local_edit(&self, id: &ProductId, products: &[Product], source: SourceTag) {
        if let Err(e) = self.cache.discard_pending(id).await {
            warn!(product_id = %id, error = %e, "Failed to drop pending change");
        }
        if let Err(e) = self.cache.replace_products(products, source).await {
            warn!(error = %e, "Failed to write product cache");
        }
        self.emit(SyncEvent::ProductsChanged {
            count: products.len(),
            source,
        });
    }

    pub async fn export(&self) -> CatalogExport {
        CatalogExport::new(self.products().await)
    }

    /// Replace the whole catalog from an export document
    pub async fn import(&self, raw: &[u8]) -> Result<usize, SyncError> {
        let document = CatalogExport::parse(raw)?;

        if !self.remote.bulk_replace(&document.products).await {
            return Err(SyncError::RemoteWriteRejected(format!(
                "{} store did not accept the import",
                self.remote.kind()
            )));
        }

        // Queued stock writes refer to the replaced catalog
        if let Err(e) = self.cache.clear_pending().await {
            warn!(error = %e, "Failed to clear pending changes after import");
        }

        let count = document.products.len();
        self.accept_remote(document.products).await;
        self.set_status(SyncStatus::info(format!("Imported {} products", count))).await;
        info!(count, "Imported catalog");
        Ok(count)
    }

    /// Filtered products and stats. `None` uses the persisted filter.
    pub async fn view(&self, filter: Option<FilterState>) -> ViewModel {
        let state = self.state.read().await;
        let filter = filter.unwrap_or_else(|| state.filter.clone());
        ViewModel::build(&state.products, &filter)
    }

    pub async fn filter_state(&self) -> FilterState {
        self.state.read().await.filter.clone()
    }

    pub async fn set_filter_state(&self, filter: FilterState) {
        if let Err(e) = self.cache.save_filter_state(&filter).await {
            warn!(error = %e, "Failed to persist filter state");
        }
        self.state.write().await.filter = filter;
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let pending_count = self.cache.pending().await.len();
        let state = self.state.read().await;
        SessionSnapshot {
            connection: state.connection,
            source: state.source,
            status: state.status.clone(),
            last_synced_at: state.last_synced_at,
            product_count: state.products.len(),
            pending_count,
        }
    }

    pub async fn product(&self, id: &ProductId) -> Result<Product, SyncError> {
        self.state
            .read()
            .await
            .products
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.clone()))
    }

    pub async fn products(&self) -> Vec<Product> {
        self.state.read().await.products.clone()
    }

    pub async fn connection(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    pub async fn pending(&self) -> Vec<PendingChange> {
        self.cache.pending().await
    }
}
