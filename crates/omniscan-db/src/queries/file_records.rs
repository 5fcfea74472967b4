//! File record query operations.
//!
//! Rows are keyed by canonical path; writes are upserts so the table always
//! holds exactly one row per tracked file.

use chrono::Utc;
use omniscan_common::{Error, FileRecord, HealthStatus, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use super::{decode_time, encode_time};

const SELECT_COLUMNS: &str =
    "SELECT path, size, modified_at, status, checked_at, fingerprint, detail FROM file_records";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let path: String = row.get(0)?;
    let size: i64 = row.get(1)?;
    let modified_at: Option<String> = row.get(2)?;
    let status: String = row.get(3)?;
    let checked_at: String = row.get(4)?;

    Ok(FileRecord {
        path: PathBuf::from(path),
        size: size.max(0) as u64,
        modified_at: modified_at.as_deref().and_then(decode_time),
        status: status.parse().unwrap_or(HealthStatus::Unknown),
        checked_at: decode_time(&checked_at).unwrap_or_else(Utc::now),
        fingerprint: row.get(5)?,
        detail: row.get(6)?,
    })
}

/// Insert or replace a record.
pub fn upsert(conn: &Connection, record: &FileRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO file_records (path, size, modified_at, status, checked_at, fingerprint, detail)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(path) DO UPDATE SET
            size = excluded.size,
            modified_at = excluded.modified_at,
            status = excluded.status,
            checked_at = excluded.checked_at,
            fingerprint = excluded.fingerprint,
            detail = excluded.detail",
        params![
            record.path.to_string_lossy(),
            record.size as i64,
            record.modified_at.as_ref().map(encode_time),
            record.status.as_str(),
            encode_time(&record.checked_at),
            record.fingerprint,
            record.detail,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Upsert a batch of records in one transaction.
pub fn upsert_many(conn: &Connection, records: &[FileRecord]) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    for record in records {
        upsert(&tx, record)?;
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(records.len())
}

/// Get a record by path.
pub fn get(conn: &Connection, path: &Path) -> Result<Option<FileRecord>> {
    conn.query_row(
        &format!("{} WHERE path = ?", SELECT_COLUMNS),
        [path.to_string_lossy()],
        row_to_record,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Delete a record. Returns whether a row was removed.
pub fn delete(conn: &Connection, path: &Path) -> Result<bool> {
    let affected = conn
        .execute(
            "DELETE FROM file_records WHERE path = ?",
            [path.to_string_lossy()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(affected > 0)
}

/// Load every record, ordered by path.
pub fn list_all(conn: &Connection) -> Result<Vec<FileRecord>> {
    let mut stmt = conn
        .prepare(&format!("{} ORDER BY path", SELECT_COLUMNS))
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([], row_to_record)
        .map_err(|e| Error::database(e.to_string()))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Count records per status.
pub fn count_by_status(conn: &Connection) -> Result<Vec<(HealthStatus, u64)>> {
    let mut stmt = conn
        .prepare("SELECT status, COUNT(*) FROM file_records GROUP BY status ORDER BY status")
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })
        .map_err(|e| Error::database(e.to_string()))?;

    let mut counts = Vec::new();
    for row in rows {
        let (status, count) = row.map_err(|e| Error::database(e.to_string()))?;
        if let Ok(status) = status.parse() {
            counts.push((status, count.max(0) as u64));
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use chrono::{TimeZone, Utc};

    fn record(path: &str, status: HealthStatus) -> FileRecord {
        let mtime = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        FileRecord::new(PathBuf::from(path), 4096, Some(mtime), status)
    }

    #[test]
    fn test_upsert_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let rec = record("/media/movies/A/a.mkv", HealthStatus::Healthy)
            .with_fingerprint(Some("abc".into()));
        upsert(&conn, &rec).unwrap();

        let loaded = get(&conn, &rec.path).unwrap().unwrap();
        assert_eq!(loaded.status, HealthStatus::Healthy);
        assert_eq!(loaded.size, 4096);
        assert_eq!(loaded.modified_at, rec.modified_at);
        assert_eq!(loaded.fingerprint.as_deref(), Some("abc"));
    }

    #[test]
    fn test_upsert_replaces() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let rec = record("/media/movies/A/a.mkv", HealthStatus::Healthy);
        upsert(&conn, &rec).unwrap();
        let rec = rec.into_missing();
        upsert(&conn, &rec).unwrap();

        let all = list_all(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, HealthStatus::Missing);
        assert!(all[0].detail.is_some());
    }

    #[test]
    fn test_upsert_many_and_counts() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let records = vec![
            record("/m/a.mkv", HealthStatus::Healthy),
            record("/m/b.mkv", HealthStatus::Healthy),
            record("/m/c.mkv", HealthStatus::CorruptZeroByte),
        ];
        assert_eq!(upsert_many(&conn, &records).unwrap(), 3);

        let counts = count_by_status(&conn).unwrap();
        assert!(counts.contains(&(HealthStatus::Healthy, 2)));
        assert!(counts.contains(&(HealthStatus::CorruptZeroByte, 1)));
    }

    #[test]
    fn test_delete() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let rec = record("/m/a.mkv", HealthStatus::Healthy);
        upsert(&conn, &rec).unwrap();
        assert!(delete(&conn, &rec.path).unwrap());
        assert!(!delete(&conn, &rec.path).unwrap());
        assert!(get(&conn, &rec.path).unwrap().is_none());
    }
}
