//! Task record operations.
//!
//! Every status transition is guarded in SQL by the current status, so a
//! terminal task can never be moved again regardless of caller ordering.

use chrono::Utc;
use mf_core::{ChatId, Error, JobKind, Result, Stage, TaskId, TaskRecord, TaskStatus, UserId};
use rusqlite::{Connection, ErrorCode};

use crate::models::{task_from_row, timestamp, TASK_COLS};

const ACTIVE: &str = "status IN ('pending', 'running')";

/// Insert a `pending` task unless the user already has an active one.
///
/// The existence check and the insert are one statement; the partial
/// unique index on active tasks backs it up across connections.
pub fn create_if_idle(
    conn: &Connection,
    user: UserId,
    chat: ChatId,
    kind: JobKind,
) -> Result<Option<TaskRecord>> {
    let id = TaskId::new();
    let q = format!(
        "INSERT INTO tasks (id, user_id, chat_id, job_kind, status, progress, created_at)
         SELECT ?1, ?2, ?3, ?4, 'pending', 0, ?5
         WHERE NOT EXISTS (SELECT 1 FROM tasks WHERE user_id = ?2 AND {ACTIVE})
         RETURNING {TASK_COLS}"
    );
    let result = conn.query_row(
        &q,
        rusqlite::params![
            id.to_string(),
            user.get(),
            chat.get(),
            kind.as_str(),
            timestamp(Utc::now())
        ],
        task_from_row,
    );
    match result {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Ok(None)
        }
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a task by ID.
pub fn get_task(conn: &Connection, id: TaskId) -> Result<Option<TaskRecord>> {
    let q = format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], task_from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// The user's pending or running task.
pub fn active_for_user(conn: &Connection, user: UserId) -> Result<Option<TaskRecord>> {
    let q = format!("SELECT {TASK_COLS} FROM tasks WHERE user_id = ?1 AND {ACTIVE}");
    match conn.query_row(&q, [user.get()], task_from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Tasks of `user`, newest first.
pub fn list_for_user(conn: &Connection, user: UserId, limit: i64) -> Result<Vec<TaskRecord>> {
    let q = format!(
        "SELECT {TASK_COLS} FROM tasks WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![user.get(), limit], task_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// `pending -> running`.
pub fn mark_running(conn: &Connection, id: TaskId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE tasks SET status = 'running', started_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            rusqlite::params![timestamp(Utc::now()), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

pub fn set_stage(conn: &Connection, id: TaskId, stage: Stage) -> Result<bool> {
    let q = format!("UPDATE tasks SET stage = ?1 WHERE id = ?2 AND {ACTIVE}");
    let n = conn
        .execute(&q, rusqlite::params![stage.as_str(), id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Raise progress; lower values and terminal tasks are left untouched.
pub fn raise_progress(conn: &Connection, id: TaskId, progress: f32) -> Result<bool> {
    let progress = f64::from(progress.clamp(0.0, 100.0));
    let q = format!(
        "UPDATE tasks SET progress = MAX(progress, ?1) WHERE id = ?2 AND {ACTIVE}"
    );
    let n = conn
        .execute(&q, rusqlite::params![progress, id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Move an active task into `status`. Returns false if it was already terminal.
pub fn finish(
    conn: &Connection,
    id: TaskId,
    status: TaskStatus,
    error: Option<&str>,
) -> Result<bool> {
    if !status.is_terminal() {
        return Err(Error::Validation(format!(
            "{status} is not a terminal task status"
        )));
    }
    let q = format!(
        "UPDATE tasks
         SET status = ?1, error = ?2, completed_at = ?3,
             progress = CASE WHEN ?1 = 'completed' THEN 100.0 ELSE progress END
         WHERE id = ?4 AND {ACTIVE}"
    );
    let n = conn
        .execute(
            &q,
            rusqlite::params![status.as_str(), error, timestamp(Utc::now()), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Cancel the user's active task, returning its id.
pub fn cancel_active(conn: &Connection, user: UserId) -> Result<Option<TaskId>> {
    let q = format!(
        "UPDATE tasks SET status = 'cancelled', completed_at = ?1
         WHERE user_id = ?2 AND {ACTIVE}
         RETURNING id"
    );
    let result = conn.query_row(&q, rusqlite::params![timestamp(Utc::now()), user.get()], |row| {
        row.get::<_, String>(0)
    });
    match result {
        Ok(id) => id
            .parse()
            .map(Some)
            .map_err(|e: uuid::Error| Error::database(e.to_string())),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Fail every active task. Returns the number of tasks reset.
pub fn reset_orphaned(conn: &Connection) -> Result<usize> {
    let q = format!(
        "UPDATE tasks SET status = 'failed', error = 'interrupted by restart', completed_at = ?1
         WHERE {ACTIVE}"
    );
    conn.execute(&q, [timestamp(Utc::now())])
        .map_err(|e| Error::database(e.to_string()))
}

/// Number of `pending` and `running` tasks across all users.
pub fn count_active(conn: &Connection) -> Result<(u64, u64)> {
    conn.query_row(
        "SELECT COALESCE(SUM(status = 'pending'), 0), COALESCE(SUM(status = 'running'), 0)
         FROM tasks",
        [],
        |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    #[test]
    fn create_blocks_second_active_task() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let first = create_if_idle(&conn, UserId(1), ChatId(1), JobKind::Encode)
            .unwrap()
            .unwrap();
        assert_eq!(first.status, TaskStatus::Pending);
        assert!(create_if_idle(&conn, UserId(1), ChatId(1), JobKind::Trim).unwrap().is_none());

        // other users are unaffected
        assert!(create_if_idle(&conn, UserId(2), ChatId(2), JobKind::Trim).unwrap().is_some());

        assert!(finish(&conn, first.id, TaskStatus::Completed, None).unwrap());
        assert!(create_if_idle(&conn, UserId(1), ChatId(1), JobKind::Trim).unwrap().is_some());
    }

    #[test]
    fn lifecycle_transitions() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let task = create_if_idle(&conn, UserId(1), ChatId(1), JobKind::Convert)
            .unwrap()
            .unwrap();

        assert!(mark_running(&conn, task.id).unwrap());
        assert!(!mark_running(&conn, task.id).unwrap());
        assert!(set_stage(&conn, task.id, Stage::Transforming).unwrap());

        let t = get_task(&conn, task.id).unwrap().unwrap();
        assert_eq!(t.status, TaskStatus::Running);
        assert_eq!(t.stage, Some(Stage::Transforming));
        assert!(t.started_at.is_some());
        assert_eq!(active_for_user(&conn, UserId(1)).unwrap().unwrap().id, task.id);
    }

    #[test]
    fn progress_never_decreases() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let task = create_if_idle(&conn, UserId(1), ChatId(1), JobKind::Sample)
            .unwrap()
            .unwrap();

        raise_progress(&conn, task.id, 40.0).unwrap();
        raise_progress(&conn, task.id, 25.0).unwrap();
        assert_eq!(get_task(&conn, task.id).unwrap().unwrap().progress, 40.0);
    }

    #[test]
    fn terminal_is_one_way() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let task = create_if_idle(&conn, UserId(1), ChatId(1), JobKind::Sample)
            .unwrap()
            .unwrap();

        assert!(finish(&conn, task.id, TaskStatus::Failed, Some("boom")).unwrap());
        assert!(!finish(&conn, task.id, TaskStatus::Completed, None).unwrap());
        assert!(!mark_running(&conn, task.id).unwrap());
        assert!(!raise_progress(&conn, task.id, 99.0).unwrap());
        assert!(!set_stage(&conn, task.id, Stage::Delivering).unwrap());

        let t = get_task(&conn, task.id).unwrap().unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.error.as_deref(), Some("boom"));
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn finish_rejects_non_terminal_status() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(finish(&conn, TaskId::new(), TaskStatus::Running, None).is_err());
    }

    #[test]
    fn cancel_active_is_idempotent() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(cancel_active(&conn, UserId(1)).unwrap().is_none());

        let task = create_if_idle(&conn, UserId(1), ChatId(1), JobKind::Encode)
            .unwrap()
            .unwrap();
        assert_eq!(cancel_active(&conn, UserId(1)).unwrap(), Some(task.id));
        assert!(cancel_active(&conn, UserId(1)).unwrap().is_none());
        assert_eq!(
            get_task(&conn, task.id).unwrap().unwrap().status,
            TaskStatus::Cancelled
        );
    }

    #[test]
    fn list_is_newest_first_and_limited() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let t = create_if_idle(&conn, UserId(1), ChatId(1), JobKind::MediaInfo)
                .unwrap()
                .unwrap();
            finish(&conn, t.id, TaskStatus::Completed, None).unwrap();
            ids.push(t.id);
        }

        let listed = list_for_user(&conn, UserId(1), 2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);
        assert_eq!(listed[1].id, ids[1]);
        assert_eq!(listed[0].progress, 100.0);
    }

    #[test]
    fn reset_orphaned_fails_active_tasks() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let a = create_if_idle(&conn, UserId(1), ChatId(1), JobKind::Encode).unwrap().unwrap();
        let b = create_if_idle(&conn, UserId(2), ChatId(2), JobKind::Encode).unwrap().unwrap();
        mark_running(&conn, b.id).unwrap();

        assert_eq!(reset_orphaned(&conn).unwrap(), 2);
        assert_eq!(get_task(&conn, a.id).unwrap().unwrap().status, TaskStatus::Failed);
        assert!(active_for_user(&conn, UserId(2)).unwrap().is_none());
        assert_eq!(reset_orphaned(&conn).unwrap(), 0);
    }

    #[test]
    fn active_tasks_are_counted_by_status() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let a = create_if_idle(&conn, UserId(1), ChatId(1), JobKind::Encode)
            .unwrap()
            .unwrap();
        create_if_idle(&conn, UserId(2), ChatId(2), JobKind::Trim).unwrap();
        let c = create_if_idle(&conn, UserId(3), ChatId(3), JobKind::Sample)
            .unwrap()
            .unwrap();
        mark_running(&conn, a.id).unwrap();
        finish(&conn, c.id, TaskStatus::Failed, Some("boom")).unwrap();

        assert_eq!(count_active(&conn).unwrap(), (1, 1));
    }
}
