//! [`SessionStore`] and [`TaskStore`] over the SQLite pool.

use mf_core::{
    ChatId, Error, FileKind, IncomingFile, JobConfig, JobKind, Preferences, Result, Session,
    SessionStore, Stage, StagedInput, TaskId, TaskRecord, TaskStatus, TaskStore, UsageStats,
    UserId,
};
use parking_lot::Mutex;
use rusqlite::Connection;

use crate::pool::{get_conn, DbPool};
use crate::queries::{sessions, staged_inputs, tasks};

/// SQLite-backed session and task store.
///
/// All access goes through one lock so that compound operations (select a
/// job and drop staged inputs, admit a task) see a single consistent view,
/// including on shared-cache in-memory databases.
pub struct SqliteStore {
    pool: DbPool,
    lock: Mutex<()>,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// User and task counts across the whole store.
    pub fn stats(&self) -> Result<UsageStats> {
        self.with_conn(|conn| {
            let (total_users, banned_users) = sessions::count_users(conn)?;
            let (pending_tasks, running_tasks) = tasks::count_active(conn)?;
            Ok(UsageStats {
                total_users,
                banned_users,
                pending_tasks,
                running_tasks,
            })
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let conn = get_conn(&self.pool)?;
        f(&conn)
    }

    fn with_tx<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| Error::database(e.to_string()))?;
            let out = f(&tx)?;
            tx.commit().map_err(|e| Error::database(e.to_string()))?;
            Ok(out)
        })
    }
}

impl SessionStore for SqliteStore {
    fn load_session(&self, user: UserId) -> Result<Session> {
        self.with_conn(|conn| sessions::load_or_create(conn, user))
    }

    fn select_job(&self, user: UserId, kind: JobKind, config: Option<JobConfig>) -> Result<()> {
        self.with_tx(|conn| {
            sessions::ensure_session(conn, user)?;
            sessions::set_job(conn, user, Some(kind), config.as_ref())?;
            staged_inputs::clear_staged(conn, user)?;
            Ok(())
        })
    }

    fn reset_job(&self, user: UserId) -> Result<()> {
        self.with_conn(|conn| sessions::set_job(conn, user, None, None).map(|_| ()))
    }

    fn update_preferences(&self, user: UserId, prefs: &Preferences) -> Result<()> {
        self.with_tx(|conn| {
            sessions::ensure_session(conn, user)?;
            sessions::set_preferences(conn, user, prefs)?;
            Ok(())
        })
    }

    fn set_banned(&self, user: UserId, banned: bool) -> Result<()> {
        self.with_tx(|conn| {
            sessions::ensure_session(conn, user)?;
            sessions::set_banned(conn, user, banned)?;
            Ok(())
        })
    }

    fn staged_inputs(&self, user: UserId) -> Result<Vec<StagedInput>> {
        self.with_conn(|conn| staged_inputs::list_staged(conn, user))
    }

    fn append_staged_input(
        &self,
        user: UserId,
        file: &IncomingFile,
        kind: FileKind,
    ) -> Result<StagedInput> {
        self.with_tx(|conn| {
            sessions::ensure_session(conn, user)?;
            staged_inputs::append_staged(conn, user, file, kind)
        })
    }

    fn clear_staged_inputs(&self, user: UserId) -> Result<usize> {
        self.with_conn(|conn| staged_inputs::clear_staged(conn, user))
    }
}

impl TaskStore for SqliteStore {
    fn try_create_task(
        &self,
        user: UserId,
        chat: ChatId,
        kind: JobKind,
    ) -> Result<Option<TaskRecord>> {
        self.with_conn(|conn| tasks::create_if_idle(conn, user, chat, kind))
    }

    fn active_task(&self, user: UserId) -> Result<Option<TaskRecord>> {
        self.with_conn(|conn| tasks::active_for_user(conn, user))
    }

    fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        self.with_conn(|conn| tasks::get_task(conn, id))
    }

    fn list_tasks(&self, user: UserId, limit: usize) -> Result<Vec<TaskRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| tasks::list_for_user(conn, user, limit))
    }

    fn mark_running(&self, id: TaskId) -> Result<bool> {
        self.with_conn(|conn| tasks::mark_running(conn, id))
    }

    fn set_stage(&self, id: TaskId, stage: Stage) -> Result<()> {
        self.with_conn(|conn| tasks::set_stage(conn, id, stage).map(|_| ()))
    }

    fn update_progress(&self, id: TaskId, progress: f32) -> Result<()> {
        self.with_conn(|conn| tasks::raise_progress(conn, id, progress).map(|_| ()))
    }

    fn finish_task(&self, id: TaskId, status: TaskStatus, error: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| tasks::finish(conn, id, status, error))
    }

    fn cancel_active(&self, user: UserId) -> Result<Option<TaskId>> {
        self.with_conn(|conn| tasks::cancel_active(conn, user))
    }

    fn reset_orphaned(&self) -> Result<usize> {
        self.with_conn(tasks::reset_orphaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use mf_core::InputSource;
    use std::sync::Arc;

    fn store() -> SqliteStore {
        SqliteStore::new(init_memory_pool().unwrap())
    }

    fn video(name: &str) -> IncomingFile {
        IncomingFile {
            name: name.into(),
            size: 10,
            source: InputSource::Url { url: format!("https://cdn.example/{name}") },
        }
    }

    #[test]
    fn selecting_a_job_drops_staged_inputs() {
        let store = store();
        let user = UserId(1);
        store.select_job(user, JobKind::Convert, None).unwrap();
        store.append_staged_input(user, &video("a.mp4"), FileKind::Video).unwrap();
        assert_eq!(store.staged_inputs(user).unwrap().len(), 1);

        store.select_job(user, JobKind::Sample, None).unwrap();
        assert!(store.staged_inputs(user).unwrap().is_empty());
        assert_eq!(store.load_session(user).unwrap().job_kind, Some(JobKind::Sample));
    }

    #[test]
    fn reset_job_keeps_preferences() {
        let store = store();
        let user = UserId(1);
        let prefs = Preferences {
            filename_template: "{original}_done".into(),
            ..Preferences::default()
        };
        store.update_preferences(user, &prefs).unwrap();
        store.select_job(user, JobKind::MediaInfo, None).unwrap();
        store.reset_job(user).unwrap();

        let s = store.load_session(user).unwrap();
        assert!(s.job_kind.is_none());
        assert_eq!(s.preferences, prefs);
    }

    #[test]
    fn concurrent_admission_yields_one_task() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .try_create_task(UserId(9), ChatId(9), JobKind::Encode)
                        .unwrap()
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();
        assert_eq!(created, 1);
        assert!(store.active_task(UserId(9)).unwrap().is_some());
    }

    #[test]
    fn ban_flag_is_stored_on_the_session() {
        let store = store();
        store.set_banned(UserId(4), true).unwrap();
        assert!(store.load_session(UserId(4)).unwrap().banned);
        store.set_banned(UserId(4), false).unwrap();
        assert!(!store.load_session(UserId(4)).unwrap().banned);
    }
}
