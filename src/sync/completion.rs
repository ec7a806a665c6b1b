//! Transfer Completion Handler: the only path that moves the watermark
//! after initialization.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::payload::discard_payload;
use super::SyncError;
use crate::db::{
    advance_watermark, delete_incremental_from, delete_pending_upload, get_pending_upload,
    get_watermark, mark_upload_confirmed, oldest_incremental_upload, SettingsContext,
};
use crate::models::{CompletionDisposition, PendingStatus, UploadKind};
use crate::transfer::{TransferCompletion, TransferOutcome};

/// Resolves transfer results against the pending descriptors.
///
/// Incremental descriptors commit in `seq` order: a confirmed descriptor
/// advances the watermark only once every older incremental descriptor
/// has been confirmed too, and only if its range starts at or before the
/// committed watermark. Replaying a completion is a no-op.
#[derive(Clone)]
pub struct CompletionHandler {
    ctx: SettingsContext,
}

impl CompletionHandler {
    pub fn new(ctx: SettingsContext) -> Self {
        Self { ctx }
    }

    /// Resolve one completion, then signal `done`. The signal fires after
    /// the bookkeeping is durable, whether or not it succeeded.
    pub async fn handle(
        &self,
        completion: TransferCompletion,
    ) -> Result<CompletionDisposition, SyncError> {
        let TransferCompletion {
            transfer_id,
            outcome,
            done,
        } = completion;
        let result = self.resolve(transfer_id, &outcome).await;
        done.done();
        result
    }

    /// Apply `outcome` to the descriptor for `transfer_id`.
    pub async fn resolve(
        &self,
        transfer_id: Uuid,
        outcome: &TransferOutcome,
    ) -> Result<CompletionDisposition, SyncError> {
        let success = outcome.is_success();
        let (disposition, payloads) = self
            .ctx
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(descriptor) = get_pending_upload(&tx, &transfer_id)? else {
                    return Ok((CompletionDisposition::Unknown, Vec::new()));
                };

                let mut payloads: Vec<PathBuf> = vec![descriptor.payload_path.clone()];
                let disposition = match (success, descriptor.kind) {
                    (true, UploadKind::Manual) => {
                        delete_pending_upload(&tx, &transfer_id)?;
                        CompletionDisposition::Confirmed { committed: None }
                    }
                    (true, UploadKind::Incremental) => {
                        mark_upload_confirmed(&tx, &transfer_id)?;
                        let mut committed = None;
                        let mut dropped = 0usize;
                        while let Some(oldest) = oldest_incremental_upload(&tx)? {
                            if oldest.status != PendingStatus::Confirmed {
                                break;
                            }
                            // A range starting past the watermark sits behind
                            // a failed one; committing it would skip the gap.
                            let contiguous = get_watermark(&tx)?
                                .is_some_and(|current| oldest.range_start <= current);
                            if !contiguous {
                                let removed = delete_incremental_from(&tx, oldest.seq)?;
                                payloads.extend(removed.iter().map(|d| d.payload_path.clone()));
                                dropped = removed.len();
                                break;
                            }
                            if let Some(ts) = advance_watermark(&tx, &oldest.proposed_watermark)? {
                                committed = Some(ts);
                            }
                            delete_pending_upload(&tx, &oldest.transfer_id)?;
                        }
                        if dropped > 0 {
                            CompletionDisposition::Superseded { dropped }
                        } else {
                            CompletionDisposition::Confirmed { committed }
                        }
                    }
                    (false, UploadKind::Manual) => {
                        delete_pending_upload(&tx, &transfer_id)?;
                        CompletionDisposition::Discarded { dropped: 1 }
                    }
                    (false, UploadKind::Incremental) => {
                        let removed = delete_incremental_from(&tx, descriptor.seq)?;
                        payloads = removed.iter().map(|d| d.payload_path.clone()).collect();
                        CompletionDisposition::Discarded {
                            dropped: removed.len(),
                        }
                    }
                };

                tx.commit()?;
                Ok((disposition, payloads))
            })
            .await?;

        for path in &payloads {
            discard_payload(path).await;
        }

        match &disposition {
            CompletionDisposition::Confirmed { committed: Some(ts) } => {
                tracing::info!(transfer = %transfer_id, watermark = %ts, "Watermark committed");
            }
            CompletionDisposition::Confirmed { committed: None } => {
                tracing::debug!(transfer = %transfer_id, "Upload confirmed");
            }
            CompletionDisposition::Discarded { dropped } => {
                tracing::warn!(
                    transfer = %transfer_id,
                    outcome = ?outcome,
                    dropped,
                    "Upload failed, range left for refetch"
                );
            }
            CompletionDisposition::Superseded { dropped } => {
                tracing::warn!(
                    transfer = %transfer_id,
                    dropped,
                    "Upload confirmed behind a failed range, left for refetch"
                );
            }
            CompletionDisposition::Unknown => {
                tracing::debug!(transfer = %transfer_id, "Completion for unknown transfer ignored");
            }
        }
        Ok(disposition)
    }
}

/// Consume completions one at a time until the transfer manager drops its
/// sender.
pub fn spawn_completion_listener(
    handler: Arc<CompletionHandler>,
    mut completions: mpsc::Receiver<TransferCompletion>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(completion) = completions.recv().await {
            if let Err(e) = handler.handle(completion).await {
                tracing::error!(error = %e, "Failed to resolve transfer completion");
            }
        }
        tracing::info!("Transfer completion feed closed");
    })
}
