//! Repository interfaces over session and task records.
//!
//! The pipeline never reads-then-writes shared state on its own: every
//! compound transition that must be atomic (task admission, terminal
//! transitions, draining staged inputs) is a single store call.

use crate::error::Result;
use crate::ids::{ChatId, TaskId, UserId};
use crate::job::{JobConfig, JobKind};
use crate::media::FileKind;
use crate::session::{
    IncomingFile, Preferences, Session, Stage, StagedInput, TaskRecord, TaskStatus,
};

/// Persistent per-principal session state.
pub trait SessionStore: Send + Sync {
    /// Load the session for `user`, creating an idle one on first contact.
    fn load_session(&self, user: UserId) -> Result<Session>;

    /// Select a job kind with its configuration. Clears any staged inputs
    /// collected for a previous selection.
    fn select_job(&self, user: UserId, kind: JobKind, config: Option<JobConfig>) -> Result<()>;

    /// Drop the job selection and configuration. Preferences are kept.
    fn reset_job(&self, user: UserId) -> Result<()>;

    fn update_preferences(&self, user: UserId, prefs: &Preferences) -> Result<()>;

    fn set_banned(&self, user: UserId, banned: bool) -> Result<()>;

    /// Staged inputs in arrival order.
    fn staged_inputs(&self, user: UserId) -> Result<Vec<StagedInput>>;

    /// Durably append a classified file to the user's staging area.
    fn append_staged_input(
        &self,
        user: UserId,
        file: &IncomingFile,
        kind: FileKind,
    ) -> Result<StagedInput>;

    /// Remove every staged input for `user`, returning how many were removed.
    fn clear_staged_inputs(&self, user: UserId) -> Result<usize>;
}

/// Persistent task records.
pub trait TaskStore: Send + Sync {
    /// Create a `pending` task unless the user already has a `pending` or
    /// `running` one. Check and insert happen atomically; `None` means an
    /// active task already exists.
    fn try_create_task(
        &self,
        user: UserId,
        chat: ChatId,
        kind: JobKind,
    ) -> Result<Option<TaskRecord>>;

    /// The user's `pending` or `running` task, if any.
    fn active_task(&self, user: UserId) -> Result<Option<TaskRecord>>;

    fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>>;

    /// Most recent tasks first.
    fn list_tasks(&self, user: UserId, limit: usize) -> Result<Vec<TaskRecord>>;

    /// `pending -> running`. Returns false when the task was no longer pending.
    fn mark_running(&self, id: TaskId) -> Result<bool>;

    /// Record the current stage of a running task. No-op once terminal.
    fn set_stage(&self, id: TaskId, stage: Stage) -> Result<()>;

    /// Raise the stored progress to `progress` if it is higher. No-op once
    /// terminal.
    fn update_progress(&self, id: TaskId, progress: f32) -> Result<()>;

    /// One-way transition into a terminal status. Returns false (and changes
    /// nothing) when the task was already terminal.
    fn finish_task(&self, id: TaskId, status: TaskStatus, error: Option<&str>) -> Result<bool>;

    /// Mark the user's active task `cancelled`, returning its id.
    fn cancel_active(&self, user: UserId) -> Result<Option<TaskId>>;

    /// Fail every task still `pending` or `running`. Used at startup to
    /// recover from a previous process that died mid-task.
    fn reset_orphaned(&self) -> Result<usize>;
}
