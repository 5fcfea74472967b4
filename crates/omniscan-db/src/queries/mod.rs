//! Database query modules.
//!
//! - file_records: durable copy of the health ledger
//! - sessions: scan session summary history

pub mod file_records;
pub mod sessions;

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamps are stored as RFC 3339 with nanosecond precision so a stored
/// mtime compares equal to a fresh stat.
pub(crate) fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
