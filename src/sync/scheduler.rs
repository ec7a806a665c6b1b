//! Upload Scheduler: durable hand-off of a fetched batch.

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use super::payload::{discard_payload, UploadPayload};
use super::SyncError;
use crate::db::{
    delete_pending_upload, get_endpoint, insert_pending_upload, list_pending_uploads,
    SettingsContext,
};
use crate::models::{EndpointConfig, FetchBatch, PendingStatus, PendingUploadDescriptor, UploadKind};
use crate::transfer::{TransferManager, TransferTask};

/// Writes batch payloads, records descriptors, and hands payloads to the
/// transfer manager.
///
/// Ordering per batch: payload file, then descriptor row, then enqueue.
/// A crash at any point leaves either nothing durable or a descriptor the
/// next startup can resume or resolve.
pub struct UploadScheduler {
    ctx: SettingsContext,
    transfer: Arc<dyn TransferManager>,
    payload_dir: PathBuf,
}

impl UploadScheduler {
    pub fn new(ctx: SettingsContext, transfer: Arc<dyn TransferManager>, payload_dir: PathBuf) -> Self {
        Self {
            ctx,
            transfer,
            payload_dir,
        }
    }

    /// Read the endpoint as it is right now. Never cached, so a token
    /// rotation applies to the next batch.
    pub async fn current_endpoint(&self) -> Result<EndpointConfig, SyncError> {
        self.ctx
            .call(|conn| get_endpoint(conn))
            .await?
            .ok_or(SyncError::EndpointMissing)
    }

    /// Schedule one batch for delivery.
    pub async fn schedule(
        &self,
        kind: UploadKind,
        batch: &FetchBatch,
        endpoint: &EndpointConfig,
    ) -> Result<PendingUploadDescriptor, SyncError> {
        let proposed_watermark = match batch.proposed_watermark {
            Some(ts) if !batch.records.is_empty() => ts,
            _ => return Err(SyncError::EmptyBatch),
        };

        let body = UploadPayload::new(batch.records.clone(), endpoint.token.clone()).to_json()?;
        let payload_path = self.write_payload(body).await?;

        let mut descriptor = PendingUploadDescriptor {
            seq: 0,
            transfer_id: Uuid::new_v4(),
            kind,
            range_start: batch.range_start,
            proposed_watermark,
            payload_path,
            record_count: batch.records.len(),
            status: PendingStatus::InFlight,
        };

        let row = descriptor.clone();
        match self.ctx.call(move |conn| insert_pending_upload(conn, &row)).await {
            Ok(seq) => descriptor.seq = seq,
            Err(e) => {
                discard_payload(&descriptor.payload_path).await;
                return Err(e.into());
            }
        }

        let task = TransferTask {
            transfer_id: descriptor.transfer_id,
            url: endpoint.url.clone(),
            payload_path: descriptor.payload_path.clone(),
        };
        if let Err(e) = self.transfer.enqueue(task).await {
            tracing::warn!(transfer = %descriptor.transfer_id, error = %e, "Transfer hand-off failed");
            self.unwind(&descriptor).await;
            return Err(e.into());
        }

        tracing::info!(
            transfer = %descriptor.transfer_id,
            kind = %descriptor.kind,
            records = descriptor.record_count,
            proposed = %descriptor.proposed_watermark,
            "Upload scheduled"
        );
        Ok(descriptor)
    }

    /// Re-enqueue in-flight descriptors left by a previous process.
    ///
    /// Returns the transfer ids that cannot be resumed (payload gone, no
    /// endpoint, or hand-off refused). The caller resolves them as failed.
    pub async fn resume_pending(&self) -> Result<Vec<Uuid>, SyncError> {
        let pending = self.ctx.call(|conn| list_pending_uploads(conn)).await?;
        let endpoint = self.current_endpoint().await.ok();

        let mut unresumable = Vec::new();
        let mut resumed = 0usize;
        for descriptor in pending
            .into_iter()
            .filter(|d| d.status == PendingStatus::InFlight)
        {
            let Some(endpoint) = endpoint.as_ref() else {
                unresumable.push(descriptor.transfer_id);
                continue;
            };
            if !tokio::fs::try_exists(&descriptor.payload_path).await.unwrap_or(false) {
                tracing::warn!(transfer = %descriptor.transfer_id, "Pending payload is gone");
                unresumable.push(descriptor.transfer_id);
                continue;
            }

            let task = TransferTask {
                transfer_id: descriptor.transfer_id,
                url: endpoint.url.clone(),
                payload_path: descriptor.payload_path.clone(),
            };
            match self.transfer.enqueue(task).await {
                Ok(()) => resumed += 1,
                Err(e) => {
                    tracing::warn!(transfer = %descriptor.transfer_id, error = %e, "Resume hand-off failed");
                    unresumable.push(descriptor.transfer_id);
                }
            }
        }

        if resumed > 0 || !unresumable.is_empty() {
            tracing::info!(resumed, unresumable = unresumable.len(), "Pending uploads resumed");
        }
        Ok(unresumable)
    }

    /// Delete payload files no descriptor refers to (left by a crash
    /// between payload write and descriptor insert). Returns how many.
    pub async fn sweep_orphaned_payloads(&self) -> Result<usize, SyncError> {
        let referenced: HashSet<PathBuf> = self
            .ctx
            .call(|conn| list_pending_uploads(conn))
            .await?
            .into_iter()
            .map(|d| d.payload_path)
            .collect();

        let mut entries = match tokio::fs::read_dir(&self.payload_dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(0), // Payload dir may not exist yet
        };

        let mut cleaned = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || referenced.contains(&path) {
                continue;
            }
            discard_payload(&path).await;
            cleaned += 1;
        }

        if cleaned > 0 {
            tracing::info!(files_cleaned = cleaned, "Cleaned orphaned payload files");
        }
        Ok(cleaned)
    }

    async fn write_payload(&self, body: Vec<u8>) -> Result<PathBuf, SyncError> {
        let dir = self.payload_dir.clone();
        let written = tokio::task::spawn_blocking(move || -> std::io::Result<PathBuf> {
            std::fs::create_dir_all(&dir)?;
            let mut file = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(".json")
                .tempfile_in(&dir)?;
            file.write_all(&body)?;
            file.as_file().sync_all()?;
            let (_, path) = file.keep()?;
            Ok(path)
        })
        .await
        .map_err(|e| SyncError::Payload(std::io::Error::other(e.to_string())))?;
        Ok(written?)
    }

    /// Undo a descriptor whose hand-off never happened.
    async fn unwind(&self, descriptor: &PendingUploadDescriptor) {
        let transfer_id = descriptor.transfer_id;
        if let Err(e) = self
            .ctx
            .call(move |conn| delete_pending_upload(conn, &transfer_id))
            .await
        {
            tracing::error!(transfer = %transfer_id, error = %e, "Failed to drop unsent descriptor");
        }
        discard_payload(&descriptor.payload_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_pending_upload, set_endpoint};
    use crate::health::memory::fixtures::{at, swim_ending};
    use crate::health::InMemoryHealthStore;
    use crate::sync::projector::{HealthStoreProjector, RecordProjector};
    use crate::transfer::recording::RecordingTransferManager;

    struct Harness {
        ctx: SettingsContext,
        transfer: Arc<RecordingTransferManager>,
        scheduler: UploadScheduler,
        dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let ctx = SettingsContext::open_in_memory().unwrap();
        let transfer = Arc::new(RecordingTransferManager::new());
        let dir = tempfile::tempdir().unwrap();
        let scheduler = UploadScheduler::new(
            ctx.clone(),
            transfer.clone(),
            dir.path().join("payloads"),
        );
        Harness {
            ctx,
            transfer,
            scheduler,
            dir,
        }
    }

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            url: "https://api.example.com/workouts".into(),
            token: "tok-1".into(),
        }
    }

    async fn batch_of(count: u32) -> FetchBatch {
        let projector = HealthStoreProjector::new(Arc::new(InMemoryHealthStore::new()));
        let mut batch = FetchBatch::empty(at(2024, 1, 1));
        for d in 0..count {
            let raw = swim_ending(at(2024, 1, 2 + d));
            batch.proposed_watermark = Some(raw.end_date);
            batch.records.push(projector.project(&raw).await);
            batch.raw_count += 1;
        }
        batch
    }

    #[tokio::test]
    async fn schedule_persists_descriptor_and_enqueues() {
        let h = harness();
        let batch = batch_of(2).await;

        let descriptor = h
            .scheduler
            .schedule(UploadKind::Incremental, &batch, &endpoint())
            .await
            .unwrap();

        assert_eq!(descriptor.record_count, 2);
        assert_eq!(descriptor.proposed_watermark, at(2024, 1, 3));
        assert_eq!(descriptor.status, PendingStatus::InFlight);

        let id = descriptor.transfer_id;
        let stored = h
            .ctx
            .call(move |conn| get_pending_upload(conn, &id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, descriptor);

        let tasks = h.transfer.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].transfer_id, id);
        assert_eq!(tasks[0].url, endpoint().url);

        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&descriptor.payload_path).unwrap()).unwrap();
        assert_eq!(body["upload_token"], "tok-1");
        assert_eq!(body["workout_results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_refused() {
        let h = harness();
        let mut batch = FetchBatch::empty(at(2024, 1, 1));
        batch.proposed_watermark = Some(at(2024, 1, 2));

        let err = h
            .scheduler
            .schedule(UploadKind::Incremental, &batch, &endpoint())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::EmptyBatch));
        assert!(h.transfer.tasks().is_empty());
    }

    #[tokio::test]
    async fn refused_hand_off_leaves_nothing_behind() {
        let h = harness();
        h.transfer.reject_next(true);

        let err = h
            .scheduler
            .schedule(UploadKind::Incremental, &batch_of(1).await, &endpoint())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transfer(_)));

        let pending = h.ctx.call(|conn| list_pending_uploads(conn)).await.unwrap();
        assert!(pending.is_empty());
        let files = std::fs::read_dir(h.dir.path().join("payloads")).unwrap().count();
        assert_eq!(files, 0);
    }

    #[tokio::test]
    async fn current_endpoint_requires_configuration() {
        let h = harness();
        assert!(matches!(
            h.scheduler.current_endpoint().await,
            Err(SyncError::EndpointMissing)
        ));

        h.ctx
            .call(|conn| set_endpoint(conn, &endpoint()))
            .await
            .unwrap();
        assert_eq!(h.scheduler.current_endpoint().await.unwrap(), endpoint());
    }

    #[tokio::test]
    async fn resume_re_enqueues_and_reports_missing_payloads() {
        let h = harness();
        h.ctx
            .call(|conn| set_endpoint(conn, &endpoint()))
            .await
            .unwrap();
        let kept = h
            .scheduler
            .schedule(UploadKind::Incremental, &batch_of(1).await, &endpoint())
            .await
            .unwrap();
        let lost = h
            .scheduler
            .schedule(UploadKind::Incremental, &batch_of(1).await, &endpoint())
            .await
            .unwrap();
        std::fs::remove_file(&lost.payload_path).unwrap();

        let unresumable = h.scheduler.resume_pending().await.unwrap();
        assert_eq!(unresumable, vec![lost.transfer_id]);

        let tasks = h.transfer.tasks();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[2].transfer_id, kept.transfer_id);
    }

    #[tokio::test]
    async fn resume_without_endpoint_reports_everything() {
        let h = harness();
        let descriptor = h
            .scheduler
            .schedule(UploadKind::Manual, &batch_of(1).await, &endpoint())
            .await
            .unwrap();

        let unresumable = h.scheduler.resume_pending().await.unwrap();
        assert_eq!(unresumable, vec![descriptor.transfer_id]);
    }

    #[tokio::test]
    async fn sweep_removes_only_unreferenced_files() {
        let h = harness();
        let descriptor = h
            .scheduler
            .schedule(UploadKind::Incremental, &batch_of(1).await, &endpoint())
            .await
            .unwrap();
        let orphan = h.dir.path().join("payloads").join("upload-orphan.json");
        std::fs::write(&orphan, b"{}").unwrap();

        assert_eq!(h.scheduler.sweep_orphaned_payloads().await.unwrap(), 1);
        assert!(!orphan.exists());
        assert!(descriptor.payload_path.exists());
    }

    #[tokio::test]
    async fn sweep_tolerates_missing_directory() {
        let h = harness();
        assert_eq!(h.scheduler.sweep_orphaned_payloads().await.unwrap(), 0);
    }
}
