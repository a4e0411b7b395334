// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::catalog::Product;
use crate::store::ProductStore;
use crate::watcher::traits::{ChangeWatcher, WatchEvent};

/// Emulates a snapshot listener by polling the store and reporting changes.
///
/// The first successful read is the baseline and is not reported.
pub struct SnapshotPoller {
    store: Arc<dyn ProductStore>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl SnapshotPoller {
    pub fn new(store: Arc<dyn ProductStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            task: None,
        }
    }

    async fn run(store: Arc<dyn ProductStore>, interval: Duration, tx: mpsc::Sender<WatchEvent>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last: Option<Vec<Product>> = None;

        loop {
            ticker.tick().await;

            let products = match store.fetch_all().await {
                Ok(products) => products,
                Err(e) => {
                    debug!(backend = %store.kind(), error = %e, "Snapshot poll failed");
                    continue;
                }
            };

            let changed = last.as_ref().is_some_and(|prev| prev != &products);
            if changed {
                debug!(count = products.len(), "Remote snapshot changed");
                if tx.send(WatchEvent::Snapshot(products.clone())).await.is_err() {
                    break;
                }
            }
            last = Some(products);
        }
    }
}

#[async_trait]
impl ChangeWatcher for SnapshotPoller {
    async fn watch(&mut self) -> anyhow::Result<mpsc::Receiver<WatchEvent>> {
        if self.task.is_some() {
            return Err(anyhow::anyhow!("Snapshot poller already running"));
        }

        let (tx, rx) = mpsc::channel(16);
        let store = Arc::clone(&self.store);
        self.task = Some(tokio::spawn(Self::run(store, self.interval, tx)));

        info!(backend = %self.store.kind(), interval_secs = self.interval.as_secs(), "Started snapshot polling");
        Ok(rx)
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!("Stopped snapshot polling");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{sample_products, MockStore};

    #[tokio::test]
    async fn test_reports_changes_after_baseline() {
        let store = Arc::new(MockStore::new(sample_products()));
        let mut poller = SnapshotPoller::new(store.clone(), Duration::from_millis(20));
        let mut events = poller.watch().await.unwrap();

        // Let the baseline be taken before mutating
        tokio::time::sleep(Duration::from_millis(60)).await;
        let mut changed = sample_products();
        changed[0].stock = 77;
        store.set_products(changed.clone());

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no snapshot event")
            .expect("channel closed");
        assert_eq!(event, WatchEvent::Snapshot(changed));

        poller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unchanged_store_emits_nothing() {
        let store = Arc::new(MockStore::new(sample_products()));
        let mut poller = SnapshotPoller::new(store, Duration::from_millis(10));
        let mut events = poller.watch().await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
        assert!(result.is_err());

        poller.stop().await.unwrap();
        assert!(events.recv().await.is_none());
    }
}
