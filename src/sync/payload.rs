//! Wire payload posted to the upload endpoint.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::SyncError;
use crate::models::ProjectedWorkout;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPayload {
    pub workout_results: Vec<ProjectedWorkout>,
    pub upload_token: String,
}

impl UploadPayload {
    pub fn new(workout_results: Vec<ProjectedWorkout>, upload_token: impl Into<String>) -> Self {
        Self {
            workout_results,
            upload_token: upload_token.into(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }
}

/// Remove a payload file. A file that is already gone is not an error.
pub(crate) async fn discard_payload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Payload removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove payload"),
    }
}
