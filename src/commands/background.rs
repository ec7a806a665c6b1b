//! Background sync commands: initialization, endpoint updates, manual
//! sync, reset, and status.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::{optional_date, required_date, CommandError};
use crate::core_state::HealthSync;
use crate::db::{clear_pending_uploads, count_pending_uploads, get_endpoint, set_endpoint};
use crate::models::EndpointConfig;
use crate::sync::payload::discard_payload;
use crate::sync::{CycleOutcome, CycleReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationStatus {
    pub authorized: bool,
}

/// Snapshot for a host status screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub watermark: Option<DateTime<Utc>>,
    pub pending_uploads: u32,
    pub observer_active: bool,
    pub endpoint_configured: bool,
}

fn endpoint_from(url: Option<&str>, token: Option<&str>) -> Result<EndpointConfig, CommandError> {
    let url = url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| CommandError::InvalidArgument("Parameter uploadUrl is required!".into()))?;
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CommandError::InvalidArgument("Parameter uploadToken is required!".into()))?;

    let parsed = reqwest::Url::parse(url).map_err(|e| {
        CommandError::InvalidArgument(format!("Parameter uploadUrl is not a valid URL: {e}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CommandError::InvalidArgument(format!(
            "Parameter uploadUrl must be http or https, got {}",
            parsed.scheme()
        )));
    }

    Ok(EndpointConfig {
        url: url.to_string(),
        token: token.to_string(),
    })
}

/// Start background sync from `start_date`.
///
/// Requests authorization, sets the watermark only if none is stored,
/// saves the endpoint, and registers the observer unless one is active.
pub async fn initialize_background_observer(
    sync: &HealthSync,
    start_date: Option<&str>,
    upload_url: Option<&str>,
    upload_token: Option<&str>,
) -> Result<AuthorizationStatus, CommandError> {
    let start = required_date("startDate", start_date)?;
    let endpoint = endpoint_from(upload_url, upload_token)?;

    if !sync.source().is_available() {
        return Err(CommandError::Unavailable);
    }
    sync.source().request_authorization().await?;

    let watermark = sync.watermark().initialize(start).await?;
    sync.settings()
        .call(move |conn| set_endpoint(conn, &endpoint))
        .await?;
    let registered = sync.controller().register()?;

    tracing::info!(%watermark, registered, "Background sync initialized");
    Ok(AuthorizationStatus { authorized: true })
}

/// Replace the upload URL and token. The watermark is untouched; the next
/// scheduled batch uses the new values.
pub async fn update_upload_properties(
    sync: &HealthSync,
    upload_url: Option<&str>,
    upload_token: Option<&str>,
) -> Result<(), CommandError> {
    let endpoint = endpoint_from(upload_url, upload_token)?;
    sync.settings()
        .call(move |conn| set_endpoint(conn, &endpoint))
        .await?;
    tracing::info!("Upload endpoint updated");
    Ok(())
}

/// Whether background sync was ever initialized. The health store cannot
/// report read-grant status, so this is the closest answer available.
pub async fn is_authorized(sync: &HealthSync) -> AuthorizationStatus {
    AuthorizationStatus {
        authorized: sync.watermark().get().await.is_some(),
    }
}

/// Upload an explicit range now. Defaults: start is the configured
/// look-back window before now, end is now.
pub async fn sync_workouts(
    sync: &HealthSync,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<CycleReport, CommandError> {
    let start = match optional_date("startDate", start_date)? {
        Some(start) => start,
        None => Utc::now() - Duration::days(sync.config().manual_sync_window_days),
    };
    let end = optional_date("endDate", end_date)?;

    let configured = sync.settings().call(|conn| get_endpoint(conn)).await?;
    if configured.is_none() {
        return Err(CommandError::InvalidArgument(
            "Upload endpoint is not configured".into(),
        ));
    }

    // Reversed bounds are swapped; the fetcher widens zero-width ones.
    let (start, end) = match end {
        Some(end) if end < start => (end, Some(start)),
        other => (start, other),
    };

    let report = sync.controller().sync_range(start, end).await;
    tracing::info!(
        batches = report.batches_scheduled,
        records = report.records_scheduled,
        outcome = ?report.outcome,
        "Manual sync finished"
    );
    match &report.outcome {
        CycleOutcome::FetchFailed => Err(CommandError::Internal("Workout query failed".into())),
        CycleOutcome::ScheduleFailed(reason) => Err(CommandError::Internal(reason.clone())),
        _ => Ok(report),
    }
}

/// Forget the watermark and drop pending uploads. The endpoint is kept and
/// the observer stays registered; its cycles do nothing until the next
/// initialization.
pub async fn reset_background_sync(sync: &HealthSync) -> Result<(), CommandError> {
    sync.watermark().set(None).await?;
    let removed = sync.settings().call(|conn| clear_pending_uploads(conn)).await?;
    for descriptor in &removed {
        discard_payload(&descriptor.payload_path).await;
    }
    tracing::info!(dropped = removed.len(), "Background sync reset");
    Ok(())
}

pub async fn get_sync_status(sync: &HealthSync) -> Result<SyncStatus, CommandError> {
    let (pending_uploads, endpoint) = sync
        .settings()
        .call(|conn| Ok((count_pending_uploads(conn)?, get_endpoint(conn)?)))
        .await?;
    Ok(SyncStatus {
        watermark: sync.watermark().get().await,
        pending_uploads,
        observer_active: sync.controller().is_observer_active(),
        endpoint_configured: endpoint.is_some(),
    })
}
