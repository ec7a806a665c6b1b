use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::EndpointConfig;

/// Watermark: everything ending at or before this instant has been delivered.
pub const KEY_UPLOAD_START_DATE: &str = "upload_start_date";
pub const KEY_UPLOAD_TARGET_URL: &str = "upload_target_url";
pub const KEY_UPLOAD_TOKEN: &str = "upload_token";

/// Get a setting by key. Returns None if not set.
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
    match stmt.query_row([key], |row| row.get::<_, String>(0)) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

/// Set a setting (upsert).
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

/// Delete a setting.
pub fn delete_setting(conn: &Connection, key: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
    Ok(())
}

// ──────────────────────────────────────────────
// Timestamps
// ──────────────────────────────────────────────

/// Canonical text form for stored instants.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_timestamp(key: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidValue {
            key: key.into(),
            value: value.into(),
        })
}

// ──────────────────────────────────────────────
// Watermark
// ──────────────────────────────────────────────

/// Read the committed watermark. `None` means sync was never initialized.
pub fn get_watermark(conn: &Connection) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    get_setting(conn, KEY_UPLOAD_START_DATE)?
        .map(|v| parse_timestamp(KEY_UPLOAD_START_DATE, &v))
        .transpose()
}

/// Overwrite the watermark; `None` clears sync initialization.
pub fn set_watermark(
    conn: &Connection,
    value: Option<&DateTime<Utc>>,
) -> Result<(), DatabaseError> {
    match value {
        Some(ts) => set_setting(conn, KEY_UPLOAD_START_DATE, &format_timestamp(ts)),
        None => delete_setting(conn, KEY_UPLOAD_START_DATE),
    }
}

/// Move the watermark forward to `candidate` if that is later than the
/// stored value. Never moves it back and never initializes an absent one.
///
/// Returns the new value when it moved.
pub fn advance_watermark(
    conn: &Connection,
    candidate: &DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    match get_watermark(conn)? {
        Some(current) if *candidate > current => {
            set_setting(conn, KEY_UPLOAD_START_DATE, &format_timestamp(candidate))?;
            Ok(Some(*candidate))
        }
        _ => Ok(None),
    }
}

// ──────────────────────────────────────────────
// Endpoint configuration
// ──────────────────────────────────────────────

/// Read the upload endpoint. Both URL and token must be present.
pub fn get_endpoint(conn: &Connection) -> Result<Option<EndpointConfig>, DatabaseError> {
    let url = get_setting(conn, KEY_UPLOAD_TARGET_URL)?;
    let token = get_setting(conn, KEY_UPLOAD_TOKEN)?;
    Ok(match (url, token) {
        (Some(url), Some(token)) => Some(EndpointConfig { url, token }),
        _ => None,
    })
}

/// Store URL and token together (transactional).
pub fn set_endpoint(conn: &Connection, endpoint: &EndpointConfig) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    set_setting(&tx, KEY_UPLOAD_TARGET_URL, &endpoint.url)?;
    set_setting(&tx, KEY_UPLOAD_TOKEN, &endpoint.token)?;
    tx.commit()?;
    Ok(())
}
