//! Staged input operations.

use chrono::Utc;
use mf_core::{Error, FileKind, IncomingFile, Result, StagedInput, StagedInputId, UserId};
use rusqlite::Connection;

use crate::models::{staged_input_from_row, timestamp, STAGED_INPUT_COLS};

/// Staged inputs for `user` in arrival order.
pub fn list_staged(conn: &Connection, user: UserId) -> Result<Vec<StagedInput>> {
    let q = format!(
        "SELECT {STAGED_INPUT_COLS} FROM staged_inputs WHERE user_id = ?1 ORDER BY position ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([user.get()], staged_input_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Append a staged input after the user's current last one.
///
/// The session row must already exist.
pub fn append_staged(
    conn: &Connection,
    user: UserId,
    file: &IncomingFile,
    kind: FileKind,
) -> Result<StagedInput> {
    let id = StagedInputId::new();
    let now = Utc::now();
    let source = serde_json::to_string(&file.source)
        .map_err(|e| Error::Internal(format!("failed to encode input source: {e}")))?;

    let q = format!(
        "INSERT INTO staged_inputs (id, user_id, kind, name, size, source, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                 (SELECT COALESCE(MAX(position), 0) + 1 FROM staged_inputs WHERE user_id = ?2),
                 ?7)
         RETURNING {STAGED_INPUT_COLS}"
    );
    conn.query_row(
        &q,
        rusqlite::params![
            id.to_string(),
            user.get(),
            kind.as_str(),
            file.name,
            file.size as i64,
            source,
            timestamp(now)
        ],
        staged_input_from_row,
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Delete every staged input of `user`.
pub fn clear_staged(conn: &Connection, user: UserId) -> Result<usize> {
    conn.execute("DELETE FROM staged_inputs WHERE user_id = ?1", [user.get()])
        .map_err(|e| Error::database(e.to_string()))
}
