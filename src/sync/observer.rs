//! Observer / Trigger Controller.
//!
//! Registers one change listener per process and, for every notification,
//! drives fetch → schedule until the store has nothing newer, then signals
//! the notification facility.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::fetcher::IncrementalFetcher;
use super::scheduler::UploadScheduler;
use super::watermark::WatermarkStore;
use super::SyncError;
use crate::health::DataSource;
use crate::models::UploadKind;

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The store has nothing past the last scheduled batch.
    Drained,
    /// No watermark: sync was never initialized or was reset.
    NotInitialized,
    /// A store query failed; nothing from that fetch was scheduled.
    FetchFailed,
    /// A batch could not be handed off.
    ScheduleFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub batches_scheduled: usize,
    pub records_scheduled: usize,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            batches_scheduled: 0,
            records_scheduled: 0,
            outcome: CycleOutcome::Drained,
        }
    }
}

pub struct TriggerController {
    source: Arc<dyn DataSource>,
    fetcher: IncrementalFetcher,
    scheduler: Arc<UploadScheduler>,
    watermark: WatermarkStore,
    batch_limit: usize,
    active: AtomicBool,
}

impl TriggerController {
    pub fn new(
        source: Arc<dyn DataSource>,
        fetcher: IncrementalFetcher,
        scheduler: Arc<UploadScheduler>,
        watermark: WatermarkStore,
        batch_limit: usize,
    ) -> Self {
        Self {
            source,
            fetcher,
            scheduler,
            watermark,
            batch_limit,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_observer_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Subscribe to change notifications and start the cycle worker.
    ///
    /// Returns `false` when a listener is already registered. If the feed
    /// later closes, the flag drops so a later call can register again.
    pub fn register(self: &Arc<Self>) -> Result<bool, SyncError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Observer already registered");
            return Ok(false);
        }

        let mut feed = match self.source.subscribe() {
            Ok(feed) => feed,
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(notification) = feed.recv().await {
                let report = controller.run_cycle().await;
                tracing::info!(
                    batches = report.batches_scheduled,
                    records = report.records_scheduled,
                    outcome = ?report.outcome,
                    "Sync cycle finished"
                );
                notification.done.done();
            }
            controller.active.store(false, Ordering::SeqCst);
            tracing::warn!("Change notification feed closed");
        });

        tracing::info!("Background observer registered");
        Ok(true)
    }

    /// One incremental cycle from the committed watermark.
    pub async fn run_cycle(&self) -> CycleReport {
        let Some(start) = self.watermark.get().await else {
            tracing::debug!("No watermark, skipping cycle");
            return CycleReport {
                outcome: CycleOutcome::NotInitialized,
                ..CycleReport::new()
            };
        };
        self.drive(UploadKind::Incremental, start, None).await
    }

    /// Upload an explicit range. Never touches the watermark.
    pub async fn sync_range(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> CycleReport {
        self.drive(UploadKind::Manual, start, end).await
    }

    /// Fetch and schedule until the store has nothing newer. A manual
    /// range includes records ending exactly at `start`; every later fetch
    /// starts strictly after the previous batch.
    async fn drive(
        &self,
        kind: UploadKind,
        mut start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> CycleReport {
        let mut report = CycleReport::new();
        let mut include_start = kind == UploadKind::Manual;

        loop {
            let batch = if include_start {
                self.fetcher.fetch_since(start, end, self.batch_limit).await
            } else {
                self.fetcher.fetch_after(start, end, self.batch_limit).await
            };
            if batch.query_failed {
                report.outcome = CycleOutcome::FetchFailed;
                break;
            }
            let Some(proposed) = batch.proposed_watermark else {
                break;
            };

            if !batch.records.is_empty() {
                let endpoint = match self.scheduler.current_endpoint().await {
                    Ok(endpoint) => endpoint,
                    Err(e) => {
                        report.outcome = CycleOutcome::ScheduleFailed(e.to_string());
                        break;
                    }
                };
                if let Err(e) = self.scheduler.schedule(kind, &batch, &endpoint).await {
                    tracing::warn!(error = %e, %start, "Failed to schedule batch");
                    report.outcome = CycleOutcome::ScheduleFailed(e.to_string());
                    break;
                }
                report.batches_scheduled += 1;
                report.records_scheduled += batch.records.len();
            }

            start = proposed;
            include_start = false;
        }

        report
    }
}
