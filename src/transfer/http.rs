//! HTTP transfer manager: POSTs payload files with retry and backoff.
//!
//! Each accepted task runs on its own tokio task: read the payload, POST it
//! as JSON, retry transport failures and retryable statuses with jittered
//! exponential backoff, then report the final outcome on the completion
//! channel and wait for the consumer to signal it is done.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{TransferCompletion, TransferError, TransferManager, TransferOutcome, TransferTask};
use crate::config::SyncConfig;
use crate::signal::DoneSignal;

/// Completion channel depth. Senders wait when the consumer falls behind.
const COMPLETION_CHANNEL_CAPACITY: usize = 64;

// ═══════════════════════════════════════════════════════════
// Retry policy
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_transfer_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Wait before the attempt following failed attempt number `attempt`
    /// (1-based): doubles each time, capped, plus up to 25% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let base = self.initial_backoff.saturating_mul(factor).min(self.max_backoff);
        let jitter_ms = (base.as_millis() / 4) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        base + Duration::from_millis(jitter)
    }
}

/// Server-side and throttling failures are worth another try; other 4xx are not.
fn is_retryable(outcome: &TransferOutcome) -> bool {
    match outcome {
        TransferOutcome::Status(code) => *code >= 500 || *code == 408 || *code == 429,
        TransferOutcome::TransportError(_) => true,
    }
}

// ═══════════════════════════════════════════════════════════
// HttpTransferManager
// ═══════════════════════════════════════════════════════════

pub struct HttpTransferManager {
    client: reqwest::Client,
    policy: RetryPolicy,
    completions: mpsc::Sender<TransferCompletion>,
    /// Transfer ids currently being delivered; re-enqueueing one is a no-op.
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl HttpTransferManager {
    /// Build the manager and the receiver its completions arrive on.
    pub fn new(
        policy: RetryPolicy,
        request_timeout: Duration,
    ) -> Result<(Self, mpsc::Receiver<TransferCompletion>), TransferError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransferError::Rejected(format!("HTTP client: {e}")))?;
        let (completions, rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);

        Ok((
            Self {
                client,
                policy,
                completions,
                in_flight: Arc::new(Mutex::new(HashSet::new())),
            },
            rx,
        ))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|set| set.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TransferManager for HttpTransferManager {
    async fn enqueue(&self, task: TransferTask) -> Result<(), TransferError> {
        if !tokio::fs::try_exists(&task.payload_path).await.unwrap_or(false) {
            return Err(TransferError::PayloadMissing(task.payload_path));
        }
        if self.completions.is_closed() {
            return Err(TransferError::Closed);
        }

        {
            let mut in_flight = self.in_flight.lock().map_err(|_| TransferError::Closed)?;
            if !in_flight.insert(task.transfer_id) {
                tracing::debug!(transfer_id = %task.transfer_id, "Transfer already in flight");
                return Ok(());
            }
        }

        let client = self.client.clone();
        let policy = self.policy.clone();
        let completions = self.completions.clone();
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let outcome = deliver(&client, &policy, &task).await;
            tracing::info!(transfer_id = %task.transfer_id, ?outcome, "Transfer finished");

            let (done, done_rx) = DoneSignal::new();
            let completion = TransferCompletion {
                transfer_id: task.transfer_id,
                outcome,
                done,
            };
            if completions.send(completion).await.is_ok() {
                // Hold the id until bookkeeping is durable so a concurrent
                // re-enqueue cannot start a second delivery.
                let _ = done_rx.await;
            } else {
                tracing::warn!(transfer_id = %task.transfer_id, "No completion consumer");
            }

            if let Ok(mut set) = in_flight.lock() {
                set.remove(&task.transfer_id);
            }
        });

        Ok(())
    }
}

async fn deliver(client: &reqwest::Client, policy: &RetryPolicy, task: &TransferTask) -> TransferOutcome {
    let mut attempt = 0;
    loop {
        attempt += 1;

        let body = match tokio::fs::read(&task.payload_path).await {
            Ok(body) => body,
            // Payload was discarded while queued; retrying cannot help.
            Err(e) => return TransferOutcome::TransportError(format!("payload unreadable: {e}")),
        };

        let outcome = match client
            .post(&task.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(response) => TransferOutcome::Status(response.status().as_u16()),
            Err(e) => TransferOutcome::TransportError(e.to_string()),
        };

        if outcome.is_success() || !is_retryable(&outcome) || attempt >= policy.max_attempts {
            return outcome;
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            transfer_id = %task.transfer_id,
            attempt,
            ?outcome,
            delay_ms = delay.as_millis() as u64,
            "Transfer attempt failed, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
