//! Incremental Fetcher: pages through the health store from a start date.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::projector::RecordProjector;
use crate::health::{DataSource, DateRange};
use crate::models::FetchBatch;

/// Reads raw workouts in end-date order, keeps swims, and projects them.
///
/// A batch holds `limit` projected records, or slightly more: a batch is
/// never cut inside a run of records sharing one end date, so the proposed
/// watermark always covers every record at that date. Non-swim records
/// are read (and advance `proposed_watermark`) but do not count toward the
/// limit.
pub struct IncrementalFetcher {
    source: Arc<dyn DataSource>,
    projector: Arc<dyn RecordProjector>,
}

impl IncrementalFetcher {
    pub fn new(source: Arc<dyn DataSource>, projector: Arc<dyn RecordProjector>) -> Self {
        Self { source, projector }
    }

    /// Fetch one batch of records ending at or after `start` and at or
    /// before `end` (now when `None`).
    pub async fn fetch_since(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> FetchBatch {
        self.fetch(start, true, end, limit).await
    }

    /// Fetch one batch of records ending strictly after `after`. Used from
    /// a watermark: everything ending at or before it was delivered.
    pub async fn fetch_after(
        &self,
        after: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> FetchBatch {
        self.fetch(after, false, end, limit).await
    }

    /// A store failure yields an empty batch with `query_failed` set, even
    /// when earlier pages were read: a partial read could stop inside a
    /// run of equal end dates.
    async fn fetch(
        &self,
        lower: DateTime<Utc>,
        inclusive: bool,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> FetchBatch {
        let end = end.unwrap_or_else(Utc::now);
        if lower > end || (!inclusive && lower == end) {
            tracing::debug!(%lower, %end, "Fetch range is empty, nothing to read");
            return FetchBatch::empty(lower);
        }

        let limit = limit.max(1);
        // One record of look-ahead tells whether the last kept record
        // closes its end-date run.
        let mut page_size = limit + 1;
        let mut batch = FetchBatch::empty(lower);
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut page_start = lower;
        let mut closing_run: Option<DateTime<Utc>> = None;

        'pages: loop {
            let range = DateRange::normalized(page_start, end);
            let page = match self.source.query_workouts(range, page_size).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(error = %e, start = %range.start, "Workout query failed");
                    batch = FetchBatch::empty(lower);
                    batch.query_failed = true;
                    break;
                }
            };

            let page_len = page.len();
            let mut fresh = 0usize;
            for raw in page {
                if !inclusive && raw.end_date <= lower {
                    continue;
                }
                if closing_run.is_some_and(|run| raw.end_date > run) {
                    break 'pages;
                }
                if !seen.insert(raw.uuid) {
                    continue;
                }
                fresh += 1;
                batch.raw_count += 1;
                page_start = page_start.max(raw.end_date);
                batch.proposed_watermark = Some(match batch.proposed_watermark {
                    Some(current) => current.max(raw.end_date),
                    None => raw.end_date,
                });

                if raw.is_swim() {
                    batch.records.push(self.projector.project(&raw).await);
                    if closing_run.is_none() && batch.records.len() >= limit {
                        closing_run = Some(raw.end_date);
                    }
                }
            }

            tracing::debug!(
                page = page_len,
                fresh,
                kept = batch.records.len(),
                "Fetched workout page"
            );

            // Short page: the store has nothing more in range.
            if page_len < page_size {
                break;
            }
            // A full page with nothing new: every record on it shares the
            // boundary date. Read a wider page from the same date.
            if fresh == 0 {
                page_size = page_size.saturating_mul(2);
            }
        }

        batch
    }
}
