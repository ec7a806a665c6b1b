//! Sync coordinator: the single shared state behind the command surface.
//!
//! `HealthSync` owns the settings context, the data source, and every
//! stage of the background pipeline. Built once at startup and shared as
//! `Arc<HealthSync>` with whichever execution context handles a command,
//! a change notification, or a transfer completion.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{self, SyncConfig};
use crate::db::{self, SettingsContext};
use crate::health::DataSource;
use crate::sync::{
    spawn_completion_listener, CompletionHandler, HealthStoreProjector, IncrementalFetcher,
    RecordProjector, SyncError, TriggerController, UploadScheduler, WatermarkStore,
};
use crate::transfer::{
    HttpTransferManager, RetryPolicy, TransferCompletion, TransferError, TransferManager,
    TransferOutcome,
};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Transfer manager error: {0}")]
    Transfer(#[from] TransferError),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("Failed to prepare data directory: {0}")]
    DataDir(#[from] std::io::Error),
}

// ═══════════════════════════════════════════════════════════
// HealthSync
// ═══════════════════════════════════════════════════════════

pub struct HealthSync {
    ctx: SettingsContext,
    source: Arc<dyn DataSource>,
    projector: Arc<dyn RecordProjector>,
    config: SyncConfig,
    watermark: WatermarkStore,
    scheduler: Arc<UploadScheduler>,
    completions: Arc<CompletionHandler>,
    controller: Arc<TriggerController>,
}

impl HealthSync {
    /// Wire the pipeline. Capabilities are negotiated here, once.
    pub fn new(
        ctx: SettingsContext,
        source: Arc<dyn DataSource>,
        transfer: Arc<dyn TransferManager>,
        payload_dir: PathBuf,
        config: SyncConfig,
    ) -> Self {
        let projector: Arc<dyn RecordProjector> =
            Arc::new(HealthStoreProjector::new(Arc::clone(&source)));
        let watermark = WatermarkStore::new(ctx.clone());
        let scheduler = Arc::new(UploadScheduler::new(ctx.clone(), transfer, payload_dir));
        let completions = Arc::new(CompletionHandler::new(ctx.clone()));
        let fetcher = IncrementalFetcher::new(Arc::clone(&source), Arc::clone(&projector));
        let controller = Arc::new(TriggerController::new(
            Arc::clone(&source),
            fetcher,
            Arc::clone(&scheduler),
            watermark.clone(),
            config.batch_limit,
        ));

        Self {
            ctx,
            source,
            projector,
            config,
            watermark,
            scheduler,
            completions,
            controller,
        }
    }

    /// Production wiring: settings database and payloads under the app
    /// data directory, HTTP transfers, then `start`.
    pub async fn launch(
        source: Arc<dyn DataSource>,
        sync_config: SyncConfig,
    ) -> Result<(Arc<Self>, JoinHandle<()>), CoreError> {
        tracing::info!("{} sync starting v{}", config::APP_NAME, config::APP_VERSION);

        std::fs::create_dir_all(config::app_data_dir())?;
        let ctx = SettingsContext::open(&config::database_path())?;
        let (transfer, completions) = HttpTransferManager::new(
            RetryPolicy::from_config(&sync_config),
            Duration::from_secs(sync_config.request_timeout_secs),
        )?;

        let sync = Arc::new(Self::new(
            ctx,
            source,
            Arc::new(transfer),
            config::payload_dir(),
            sync_config,
        ));
        let listener = sync.start(completions).await?;
        Ok((sync, listener))
    }

    /// Startup: clean up after the previous process, pick up its pending
    /// transfers, and re-register the observer if sync was initialized.
    ///
    /// Returns the completion listener task.
    pub async fn start(
        self: &Arc<Self>,
        completions: mpsc::Receiver<TransferCompletion>,
    ) -> Result<JoinHandle<()>, SyncError> {
        self.scheduler.sweep_orphaned_payloads().await?;
        let listener = spawn_completion_listener(Arc::clone(&self.completions), completions);

        for transfer_id in self.scheduler.resume_pending().await? {
            let outcome = TransferOutcome::TransportError("not resumable after restart".into());
            self.completions.resolve(transfer_id, &outcome).await?;
        }

        if self.watermark.get().await.is_some() {
            if let Err(e) = self.controller.register() {
                tracing::warn!(error = %e, "Failed to re-register background observer");
            }
        }
        Ok(listener)
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn settings(&self) -> &SettingsContext {
        &self.ctx
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn projector(&self) -> &Arc<dyn RecordProjector> {
        &self.projector
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn watermark(&self) -> &WatermarkStore {
        &self.watermark
    }

    pub fn controller(&self) -> &Arc<TriggerController> {
        &self.controller
    }

    pub fn completions(&self) -> &Arc<CompletionHandler> {
        &self.completions
    }
}
