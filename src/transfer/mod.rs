//! Deferred upload hand-off.
//!
//! A `TransferManager` accepts a payload file and a target URL and delivers
//! it on its own schedule, outside the caller's execution window. Results
//! come back later as `TransferCompletion`s on a channel, possibly after the
//! process was restarted and the transfer re-enqueued from durable state.

pub mod http;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::signal::DoneSignal;

pub use http::{HttpTransferManager, RetryPolicy};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Payload not found: {0}")]
    PayloadMissing(PathBuf),

    #[error("Transfer manager is shut down")]
    Closed,

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// One payload to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub transfer_id: Uuid,
    pub url: String,
    pub payload_path: PathBuf,
}

/// Final result of a transfer after the manager stopped retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    /// The server answered with this HTTP status.
    Status(u16),
    /// No usable response (connect failure, timeout, unreadable payload).
    TransportError(String),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Status(code) if (200..300).contains(code))
    }
}

/// Completion callback for one transfer. The manager keeps its execution
/// window open until `done` is signalled.
#[derive(Debug)]
pub struct TransferCompletion {
    pub transfer_id: Uuid,
    pub outcome: TransferOutcome,
    pub done: DoneSignal,
}

#[async_trait]
pub trait TransferManager: Send + Sync {
    /// Accept a task for background delivery. Returns once the task is
    /// queued, never waiting for the network.
    async fn enqueue(&self, task: TransferTask) -> Result<(), TransferError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_2xx_is_success() {
        assert!(TransferOutcome::Status(200).is_success());
        assert!(TransferOutcome::Status(204).is_success());
        assert!(!TransferOutcome::Status(199).is_success());
        assert!(!TransferOutcome::Status(301).is_success());
        assert!(!TransferOutcome::Status(500).is_success());
        assert!(!TransferOutcome::TransportError("reset".into()).is_success());
    }
}
