//! Row decoding into the mf-core record shapes.
//!
//! Each `*_from_row` function expects the columns in the order of the
//! matching `*_COLS` constant.

use chrono::{DateTime, SecondsFormat, Utc};
use mf_core::{ChatId, Session, StagedInput, TaskRecord, UserId};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use uuid::Uuid;

pub const SESSION_COLS: &str =
    "user_id, job_kind, job_config, preferences, banned, created_at, updated_at";

pub const STAGED_INPUT_COLS: &str =
    "id, user_id, kind, name, size, source, position, created_at";

pub const TASK_COLS: &str = "id, user_id, chat_id, job_kind, status, stage, progress, error,
    created_at, started_at, completed_at";

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Format a timestamp for storage. Fixed width so text order is time order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))?;
    Ok(T::from(uuid))
}

/// Parse a text column through `FromStr`.
fn parse_text<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: String| conversion_error(idx, e))
}

fn parse_opt_text<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|v| v.parse().map_err(|e: String| conversion_error(idx, e)))
        .transpose()
}

fn parse_json<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_error(idx, e))
}

fn parse_opt_json<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|v| serde_json::from_str(&v).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn parse_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|v| {
        DateTime::parse_from_rfc3339(&v)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

// ---------------------------------------------------------------------------
// rows
// ---------------------------------------------------------------------------

pub fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        user_id: UserId(row.get(0)?),
        job_kind: parse_opt_text(row, 1)?,
        job_config: parse_opt_json(row, 2)?,
        preferences: parse_json(row, 3)?,
        banned: row.get::<_, i64>(4)? != 0,
        created_at: parse_ts(row, 5)?,
        updated_at: parse_ts(row, 6)?,
    })
}

pub fn staged_input_from_row(row: &Row) -> rusqlite::Result<StagedInput> {
    Ok(StagedInput {
        id: parse_id(row, 0)?,
        user_id: UserId(row.get(1)?),
        kind: parse_text(row, 2)?,
        name: row.get(3)?,
        size: row.get::<_, i64>(4)?.max(0) as u64,
        source: parse_json(row, 5)?,
        position: row.get(6)?,
        created_at: parse_ts(row, 7)?,
    })
}

pub fn task_from_row(row: &Row) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: parse_id(row, 0)?,
        user_id: UserId(row.get(1)?),
        chat_id: ChatId(row.get(2)?),
        kind: parse_text(row, 3)?,
        status: parse_text(row, 4)?,
        stage: parse_opt_text(row, 5)?,
        progress: row.get::<_, f64>(6).unwrap_or(0.0) as f32,
        error: row.get(7)?,
        created_at: parse_ts(row, 8)?,
        started_at: parse_opt_ts(row, 9)?,
        completed_at: parse_opt_ts(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_as_text() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (ta, tb) = (timestamp(a), timestamp(b));
        assert_eq!(ta.len(), tb.len());
        assert!(ta < tb);
        assert!(ta.ends_with('Z'));
    }
}
