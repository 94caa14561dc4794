//! Session operations.

use chrono::Utc;
use mf_core::{Error, JobConfig, JobKind, Preferences, Result, Session, UserId};
use rusqlite::Connection;

use crate::models::{session_from_row, timestamp, SESSION_COLS};

/// Get a session by user.
pub fn get_session(conn: &Connection, user: UserId) -> Result<Option<Session>> {
    let q = format!("SELECT {SESSION_COLS} FROM sessions WHERE user_id = ?1");
    match conn.query_row(&q, [user.get()], session_from_row) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Create an idle session for `user` unless one exists. Returns true when a
/// new row was inserted.
pub fn ensure_session(conn: &Connection, user: UserId) -> Result<bool> {
    let now = timestamp(Utc::now());
    let n = conn
        .execute(
            "INSERT OR IGNORE INTO sessions (user_id, created_at, updated_at)
             VALUES (?1, ?2, ?2)",
            rusqlite::params![user.get(), now],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Load the session for `user`, creating it on first contact.
pub fn load_or_create(conn: &Connection, user: UserId) -> Result<Session> {
    if ensure_session(conn, user)? {
        tracing::debug!(user_id = %user, "created session");
    }
    get_session(conn, user)?.ok_or_else(|| Error::not_found("session", user))
}

/// Replace the job selection and its configuration.
pub fn set_job(
    conn: &Connection,
    user: UserId,
    kind: Option<JobKind>,
    config: Option<&JobConfig>,
) -> Result<bool> {
    let config_json = config
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("failed to encode job config: {e}")))?;
    let n = conn
        .execute(
            "UPDATE sessions SET job_kind = ?1, job_config = ?2, updated_at = ?3
             WHERE user_id = ?4",
            rusqlite::params![
                kind.map(|k| k.as_str()),
                config_json,
                timestamp(Utc::now()),
                user.get()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

pub fn set_preferences(conn: &Connection, user: UserId, prefs: &Preferences) -> Result<bool> {
    let json = serde_json::to_string(prefs)
        .map_err(|e| Error::Internal(format!("failed to encode preferences: {e}")))?;
    let n = conn
        .execute(
            "UPDATE sessions SET preferences = ?1, updated_at = ?2 WHERE user_id = ?3",
            rusqlite::params![json, timestamp(Utc::now()), user.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

pub fn set_banned(conn: &Connection, user: UserId, banned: bool) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE sessions SET banned = ?1, updated_at = ?2 WHERE user_id = ?3",
            rusqlite::params![banned as i64, timestamp(Utc::now()), user.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Number of known users and how many of them are banned.
pub fn count_users(conn: &Connection) -> Result<(u64, u64)> {
    conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(banned), 0) FROM sessions",
        [],
        |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
    )
    .map_err(|e| Error::database(e.to_string()))
}
