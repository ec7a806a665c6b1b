use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::settings::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::{PendingStatus, PendingUploadDescriptor, UploadKind};

const SELECT_COLUMNS: &str = "SELECT seq, transfer_id, kind, range_start, proposed_watermark,
                                     payload_path, record_count, status
                              FROM pending_uploads";

/// Record a new in-flight transfer. Returns the assigned sequence number.
pub fn insert_pending_upload(
    conn: &Connection,
    descriptor: &PendingUploadDescriptor,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO pending_uploads
         (transfer_id, kind, range_start, proposed_watermark, payload_path, record_count, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            descriptor.transfer_id.to_string(),
            descriptor.kind.as_str(),
            format_timestamp(&descriptor.range_start),
            format_timestamp(&descriptor.proposed_watermark),
            descriptor.payload_path.to_string_lossy().into_owned(),
            descriptor.record_count as i64,
            descriptor.status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Look up a descriptor by transfer id.
pub fn get_pending_upload(
    conn: &Connection,
    transfer_id: &Uuid,
) -> Result<Option<PendingUploadDescriptor>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE transfer_id = ?1"),
            [transfer_id.to_string()],
            map_row,
        )
        .optional()?;
    row.map(descriptor_from_row).transpose()
}

/// All descriptors, oldest first.
pub fn list_pending_uploads(conn: &Connection) -> Result<Vec<PendingUploadDescriptor>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY seq ASC"))?;
    let rows = stmt.query_map([], map_row)?;

    let mut descriptors = Vec::new();
    for row in rows {
        descriptors.push(descriptor_from_row(row?)?);
    }
    Ok(descriptors)
}

/// The oldest incremental descriptor, which gates every later commit.
pub fn oldest_incremental_upload(
    conn: &Connection,
) -> Result<Option<PendingUploadDescriptor>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE kind = 'incremental' ORDER BY seq ASC LIMIT 1"),
            [],
            map_row,
        )
        .optional()?;
    row.map(descriptor_from_row).transpose()
}

pub fn count_pending_uploads(conn: &Connection) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM pending_uploads", [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

pub fn mark_upload_confirmed(conn: &Connection, transfer_id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE pending_uploads SET status = 'confirmed' WHERE transfer_id = ?1",
        [transfer_id.to_string()],
    )?;
    Ok(())
}

pub fn delete_pending_upload(conn: &Connection, transfer_id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM pending_uploads WHERE transfer_id = ?1",
        [transfer_id.to_string()],
    )?;
    Ok(())
}

/// Delete every incremental descriptor at or after `seq`. Returns what
/// was removed so the caller can clean up payload files.
pub fn delete_incremental_from(
    conn: &Connection,
    seq: i64,
) -> Result<Vec<PendingUploadDescriptor>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE kind = 'incremental' AND seq >= ?1 ORDER BY seq ASC"
    ))?;
    let rows = stmt.query_map([seq], map_row)?;

    let mut removed = Vec::new();
    for row in rows {
        removed.push(descriptor_from_row(row?)?);
    }

    conn.execute(
        "DELETE FROM pending_uploads WHERE kind = 'incremental' AND seq >= ?1",
        [seq],
    )?;
    Ok(removed)
}

/// Drop every descriptor (sync reset). Returns what was removed.
pub fn clear_pending_uploads(
    conn: &Connection,
) -> Result<Vec<PendingUploadDescriptor>, DatabaseError> {
    let removed = list_pending_uploads(conn)?;
    conn.execute("DELETE FROM pending_uploads", [])?;
    Ok(removed)
}

// ──────────────────────────────────────────────
// Row mapping
// ──────────────────────────────────────────────

struct PendingRow {
    seq: i64,
    transfer_id: String,
    kind: String,
    range_start: String,
    proposed_watermark: String,
    payload_path: String,
    record_count: i64,
    status: String,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingRow> {
    Ok(PendingRow {
        seq: row.get(0)?,
        transfer_id: row.get(1)?,
        kind: row.get(2)?,
        range_start: row.get(3)?,
        proposed_watermark: row.get(4)?,
        payload_path: row.get(5)?,
        record_count: row.get(6)?,
        status: row.get(7)?,
    })
}

fn descriptor_from_row(row: PendingRow) -> Result<PendingUploadDescriptor, DatabaseError> {
    let transfer_id = Uuid::parse_str(&row.transfer_id).map_err(|_| DatabaseError::InvalidValue {
        key: "transfer_id".into(),
        value: row.transfer_id.clone(),
    })?;

    Ok(PendingUploadDescriptor {
        seq: row.seq,
        transfer_id,
        kind: row.kind.parse::<UploadKind>()?,
        range_start: parse_timestamp("range_start", &row.range_start)?,
        proposed_watermark: parse_timestamp("proposed_watermark", &row.proposed_watermark)?,
        payload_path: PathBuf::from(row.payload_path),
        record_count: row.record_count.max(0) as usize,
        status: row.status.parse::<PendingStatus>()?,
    })
}
