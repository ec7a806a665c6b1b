//! Command surface for the host application.
//!
//! Each command is a plain async request/response over the shared
//! `HealthSync`. Errors serialize to a single string for the host bridge.

pub mod background;
pub mod workouts;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::db::DatabaseError;
use crate::health::SourceError;
use crate::sync::SyncError;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Health data not available")]
    Unavailable,

    #[error("Authorization denied: {0}")]
    Denied(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Internal(String),
}

impl Serialize for CommandError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<SourceError> for CommandError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Unavailable => Self::Unavailable,
            SourceError::Denied(reason) => Self::Denied(reason),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Source(source) => source.into(),
            SyncError::EndpointMissing => Self::InvalidArgument(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<DatabaseError> for CommandError {
    fn from(e: DatabaseError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Parse a required ISO-8601 date argument named `name`.
pub(crate) fn required_date(name: &str, raw: Option<&str>) -> Result<DateTime<Utc>, CommandError> {
    match raw {
        Some(raw) => parse_date(name, raw),
        None => Err(CommandError::InvalidArgument(format!(
            "Parameter {name} is required!"
        ))),
    }
}

/// Parse an optional ISO-8601 date argument named `name`.
pub(crate) fn optional_date(
    name: &str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, CommandError> {
    raw.map(|raw| parse_date(name, raw)).transpose()
}

fn parse_date(name: &str, raw: &str) -> Result<DateTime<Utc>, CommandError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            CommandError::InvalidArgument(format!(
                "Parameter {name} is not an ISO-8601 date ({raw}): {e}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn errors_serialize_as_plain_strings() {
        let json = serde_json::to_string(&CommandError::Unavailable).unwrap();
        assert_eq!(json, "\"Health data not available\"");

        let json = serde_json::to_string(&CommandError::InvalidArgument(
            "Parameter startDate is required!".into(),
        ))
        .unwrap();
        assert_eq!(json, "\"Parameter startDate is required!\"");
    }

    #[test]
    fn source_errors_map_to_command_errors() {
        assert_eq!(CommandError::from(SourceError::Unavailable), CommandError::Unavailable);
        assert_eq!(
            CommandError::from(SourceError::Denied("no".into())),
            CommandError::Denied("no".into())
        );
        assert!(matches!(
            CommandError::from(SourceError::Query("x".into())),
            CommandError::Internal(_)
        ));
        assert!(matches!(
            CommandError::from(SyncError::EndpointMissing),
            CommandError::InvalidArgument(_)
        ));
    }

    #[test]
    fn required_date_reports_missing_parameter() {
        assert_eq!(
            required_date("startDate", None),
            Err(CommandError::InvalidArgument(
                "Parameter startDate is required!".into()
            ))
        );
    }

    #[test]
    fn dates_parse_with_offsets() {
        let parsed = required_date("startDate", Some("2024-01-01T02:00:00+02:00")).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(required_date("startDate", Some("yesterday")).is_err());
        assert_eq!(optional_date("endDate", None), Ok(None));
    }
}
