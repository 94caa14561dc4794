//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order. A
//! `schema_migrations` table tracks which versions have been applied.

use mf_core::{Error, Result};
use rusqlite::Connection;

/// V1: sessions, staged inputs and tasks.
const V1_INITIAL: &str = r#"
CREATE TABLE sessions (
    user_id     INTEGER PRIMARY KEY,
    job_kind    TEXT,
    job_config  TEXT,
    preferences TEXT NOT NULL DEFAULT '{}',
    banned      INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE staged_inputs (
    id         TEXT PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES sessions(user_id) ON DELETE CASCADE,
    kind       TEXT NOT NULL,
    name       TEXT NOT NULL,
    size       INTEGER NOT NULL,
    source     TEXT NOT NULL,
    position   INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX idx_staged_inputs_user ON staged_inputs(user_id, position);

CREATE TABLE tasks (
    id           TEXT PRIMARY KEY,
    user_id      INTEGER NOT NULL,
    chat_id      INTEGER NOT NULL,
    job_kind     TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',
    stage        TEXT,
    progress     REAL NOT NULL DEFAULT 0,
    error        TEXT,
    created_at   TEXT NOT NULL,
    started_at   TEXT,
    completed_at TEXT
);

CREATE INDEX idx_tasks_user ON tasks(user_id, created_at);
"#;

/// V2: at most one pending or running task per user.
const V2_ONE_ACTIVE_TASK: &str = r#"
CREATE UNIQUE INDEX idx_tasks_one_active ON tasks(user_id)
    WHERE status IN ('pending', 'running');
"#;

/// All migrations in order.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_ONE_ACTIVE_TASK)];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        tracing::debug!(version, "applied migration");
    }

    Ok(())
}
