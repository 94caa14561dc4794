//! Task admission: at most one pending or running task per user.
//!
//! The store's atomic create-if-idle is the source of truth. The in-memory
//! map only carries the cancellation token of each admitted task.

use std::sync::Arc;

use dashmap::DashMap;
use mf_core::{ChatId, Error, JobKind, SessionStore, TaskId, TaskRecord, TaskStatus, TaskStore, UserId};
use tokio_util::sync::CancellationToken;

/// An admitted task plus the token its executor watches.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub record: TaskRecord,
    pub cancel: CancellationToken,
}

pub struct TaskAdmission {
    tasks: Arc<dyn TaskStore>,
    sessions: Arc<dyn SessionStore>,
    active: DashMap<UserId, (TaskId, CancellationToken)>,
}

impl TaskAdmission {
    pub fn new(tasks: Arc<dyn TaskStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            tasks,
            sessions,
            active: DashMap::new(),
        }
    }

    /// Create a `pending` task for `user`.
    ///
    /// Fails with [`Error::AlreadyRunning`] when the user already has an
    /// active task; the existing task is left untouched.
    pub fn admit(&self, user: UserId, chat: ChatId, kind: JobKind) -> mf_core::Result<TaskHandle> {
        // A second round only happens if the blocking task finished between
        // the failed insert and the lookup.
        for _ in 0..2 {
            if let Some(record) = self.tasks.try_create_task(user, chat, kind)? {
                let cancel = CancellationToken::new();
                self.active.insert(user, (record.id, cancel.clone()));
                tracing::info!(task_id = %record.id, user_id = %user, job_kind = %kind, "task admitted");
                return Ok(TaskHandle { record, cancel });
            }
            if let Some(existing) = self.tasks.active_task(user)? {
                tracing::debug!(task_id = %existing.id, user_id = %user, "admission refused");
                return Err(Error::AlreadyRunning {
                    task_id: existing.id,
                });
            }
        }
        Err(Error::Internal(format!(
            "admission for user {user} kept racing with task completion"
        )))
    }

    /// Cancel the user's active task, if any, and clear their staged inputs.
    ///
    /// Idempotent: with nothing to cancel this is a successful no-op.
    /// Returns the cancelled task.
    pub fn cancel(&self, user: UserId) -> mf_core::Result<Option<TaskId>> {
        let cancelled = self.tasks.cancel_active(user)?;
        if let Some((_, (task_id, token))) = self.active.remove(&user) {
            tracing::info!(task_id = %task_id, user_id = %user, "cancellation requested");
            token.cancel();
        }
        let cleared = self.sessions.clear_staged_inputs(user)?;
        if cleared > 0 {
            tracing::debug!(user_id = %user, cleared, "staged inputs cleared");
        }
        Ok(cancelled)
    }

    /// Move `task` to its terminal state. Calling it again, or after a
    /// cancellation already ended the task, changes nothing.
    ///
    /// Returns whether this call performed the transition.
    pub fn complete(
        &self,
        user: UserId,
        task: TaskId,
        status: TaskStatus,
        error: Option<&str>,
    ) -> mf_core::Result<bool> {
        self.active.remove_if(&user, |_, (id, _)| *id == task);
        self.tasks.finish_task(task, status, error)
    }

    /// Whether `user` holds an admitted task in this process.
    pub fn is_active(&self, user: UserId) -> bool {
        self.active.contains_key(&user)
    }

    /// Cancel every admitted task and reset its owner's session. Used at
    /// shutdown.
    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            let user = *entry.key();
            entry.value().1.cancel();
            if let Err(e) = self.sessions.clear_staged_inputs(user) {
                tracing::warn!(user_id = %user, "failed to clear staged inputs: {e}");
            }
            if let Err(e) = self.sessions.reset_job(user) {
                tracing::warn!(user_id = %user, "failed to reset job selection: {e}");
            }
        }
    }
}
