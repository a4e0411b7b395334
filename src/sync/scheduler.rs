// SPDX-License-Identifier: GPL-3.0-only
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::sync::coordinator::SyncCoordinator;

/// Runs `sync_now` every `period` until stopped.
pub struct SyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    period: Duration,
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    pub fn new(coordinator: Arc<SyncCoordinator>, period: Duration) -> Self {
        Self { coordinator, period }
    }

    pub fn start(self) -> SchedulerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);

        let task = tokio::spawn(async move {
            // start() already loaded once, so the first pass waits a full period
            let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = self.period.as_secs(), "Sync scheduler started");

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        info!("Sync scheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = self.coordinator.sync_now().await;
                        debug!(
                            sync_id = %report.sync_id,
                            skipped = report.skipped,
                            replayed = report.replayed,
                            remaining = report.remaining,
                            "Scheduled sync finished"
                        );
                    }
                }
            }
        });

        SchedulerHandle { shutdown, task }
    }
}

impl SchedulerHandle {
    /// Signal the loop and wait for it to exit. A pass already in progress
    /// finishes first.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Sync scheduler task ended abnormally");
        }
    }
}
