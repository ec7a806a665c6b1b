use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Swimified";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable prefix for `SyncConfig` overrides.
const ENV_PREFIX: &str = "SWIMIFIED_";

/// Get the application data directory.
/// Falls back to the temp directory on platforms without a data dir.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Settings database (watermark, endpoint, pending uploads).
pub fn database_path() -> PathBuf {
    app_data_dir().join("sync.db")
}

/// Directory holding serialized upload payloads until their transfer resolves.
pub fn payload_dir() -> PathBuf {
    app_data_dir().join("payloads")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,swimified_lib=debug"
}

/// Tunables for the background sync pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Raw records requested per data-store page.
    pub batch_limit: usize,
    /// Attempts per transfer before the outcome is reported.
    pub max_transfer_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
    /// Default look-back for a manual sync without a start date.
    pub manual_sync_window_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_limit: 25,
            max_transfer_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 60_000,
            request_timeout_secs: 60,
            manual_sync_window_days: 7,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `SWIMIFIED_*` environment variables.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        override_from(&lookup, "BATCH_LIMIT", &mut config.batch_limit);
        override_from(&lookup, "MAX_TRANSFER_ATTEMPTS", &mut config.max_transfer_attempts);
        override_from(&lookup, "INITIAL_BACKOFF_MS", &mut config.initial_backoff_ms);
        override_from(&lookup, "MAX_BACKOFF_MS", &mut config.max_backoff_ms);
        override_from(&lookup, "REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs);
        override_from(&lookup, "MANUAL_SYNC_WINDOW_DAYS", &mut config.manual_sync_window_days);
        config.batch_limit = config.batch_limit.max(1);
        config
    }
}

fn override_from<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    slot: &mut T,
) {
    let key = format!("{ENV_PREFIX}{name}");
    if let Some(raw) = lookup(&key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key = %key, value = %raw, "Ignoring unparseable config override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn paths_live_under_app_data() {
        let app = app_data_dir();
        assert!(app.ends_with(APP_NAME));
        assert!(database_path().starts_with(&app));
        assert!(payload_dir().starts_with(&app));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("SWIMIFIED_BATCH_LIMIT", "50"),
            ("SWIMIFIED_MAX_TRANSFER_ATTEMPTS", " 2 "),
        ]
        .into_iter()
        .collect();

        let config = SyncConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.batch_limit, 50);
        assert_eq!(config.max_transfer_attempts, 2);
        assert_eq!(config.max_backoff_ms, SyncConfig::default().max_backoff_ms);
    }

    #[test]
    fn bad_override_keeps_default() {
        let config = SyncConfig::from_lookup(|k| {
            (k == "SWIMIFIED_BATCH_LIMIT").then(|| "lots".to_string())
        });
        assert_eq!(config.batch_limit, 25);
    }

    #[test]
    fn zero_batch_limit_is_clamped() {
        let config = SyncConfig::from_lookup(|k| {
            (k == "SWIMIFIED_BATCH_LIMIT").then(|| "0".to_string())
        });
        assert_eq!(config.batch_limit, 1);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"batch_limit": 10}"#).unwrap();
        assert_eq!(config.batch_limit, 10);
        assert_eq!(config.manual_sync_window_days, 7);
    }
}
