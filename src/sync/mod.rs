//! Background sync pipeline.
//!
//! ```text
//! change notification → TriggerController ─┬─ IncrementalFetcher → RecordProjector
//!                                          └─ UploadScheduler → TransferManager
//! TransferManager completion → CompletionHandler → watermark commit
//! ```
//!
//! The committed watermark moves only when a transfer is confirmed, and
//! only across the contiguous prefix of confirmed batches. Anything past
//! it is refetched by the next cycle, so records are delivered at least
//! once and never silently dropped.

pub mod completion;
pub mod fetcher;
pub mod observer;
pub mod payload;
pub mod projector;
pub mod scheduler;
pub mod watermark;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::health::SourceError;
use crate::transfer::TransferError;

pub use completion::{spawn_completion_listener, CompletionHandler};
pub use fetcher::IncrementalFetcher;
pub use observer::{CycleOutcome, CycleReport, TriggerController};
pub use payload::UploadPayload;
pub use projector::{HealthStoreProjector, RecordProjector};
pub use scheduler::UploadScheduler;
pub use watermark::WatermarkStore;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Health store error: {0}")]
    Source(#[from] SourceError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Payload write failed: {0}")]
    Payload(#[from] std::io::Error),

    #[error("Upload endpoint is not configured")]
    EndpointMissing,

    #[error("Batch has no records to upload")]
    EmptyBatch,

    #[error("Transfer hand-off failed: {0}")]
    Transfer(#[from] TransferError),
}
