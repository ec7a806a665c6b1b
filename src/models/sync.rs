//! Sync bookkeeping types shared by the fetcher, scheduler and completion handler.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{PendingStatus, UploadKind};
use super::workout::ProjectedWorkout;

/// Upload target and the opaque token sent along with every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub token: String,
}

/// One fetch worth of projected records.
///
/// `proposed_watermark` is the latest end date among the raw records read,
/// swim or not, and is `None` only when the store returned no raw records.
#[derive(Debug, Clone)]
pub struct FetchBatch {
    pub range_start: DateTime<Utc>,
    pub records: Vec<ProjectedWorkout>,
    pub proposed_watermark: Option<DateTime<Utc>>,
    pub raw_count: usize,
    /// The store query failed: no progress, retry later.
    pub query_failed: bool,
}

impl FetchBatch {
    pub fn empty(range_start: DateTime<Utc>) -> Self {
        Self {
            range_start,
            records: Vec::new(),
            proposed_watermark: None,
            raw_count: 0,
            query_failed: false,
        }
    }

    /// The store had nothing (more) in this range.
    pub fn is_exhausted(&self) -> bool {
        !self.query_failed && self.proposed_watermark.is_none()
    }
}

/// Ties one in-flight transfer to the watermark it commits on success.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUploadDescriptor {
    pub seq: i64,
    pub transfer_id: Uuid,
    pub kind: UploadKind,
    pub range_start: DateTime<Utc>,
    pub proposed_watermark: DateTime<Utc>,
    pub payload_path: PathBuf,
    pub record_count: usize,
    pub status: PendingStatus,
}

/// What the completion handler did with one transfer result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionDisposition {
    /// Confirmed; `committed` is the watermark now stored, if it moved.
    Confirmed { committed: Option<DateTime<Utc>> },
    /// Failed; the descriptor and every later incremental one were dropped.
    Discarded { dropped: usize },
    /// Confirmed, but its range starts past the committed watermark because
    /// an earlier range failed. Dropped with every later incremental one so
    /// the gap is refetched.
    Superseded { dropped: usize },
    /// No descriptor matched (duplicate or already-resolved callback).
    Unknown,
}
