//! Entry points the transport layer calls into.
//!
//! [`JobService`] owns the intake accumulator and the pipeline executor.
//! File arrivals are staged until the selected job kind has everything it
//! needs; the arrival that completes the inputs admits a task and spawns its
//! executor. Task progress and outcomes are published on the event bus.

use std::collections::HashMap;
use std::sync::Arc;

use mf_core::events::{Event, EventCategory, EventPayload};
use mf_core::{
    ChatId, DownloadSource, Error, IncomingFile, InputSource, JobConfig, JobKind, JobSpec,
    PreconditionError, Preferences, SessionStore, StagedInput, TaskId, TaskOutcome, TaskRecord,
    TaskStore, UsageStats, UserId,
};
use mf_pipeline::{IntakeAccumulator, IntakeOutcome, PipelineExecutor, TaskJob};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::context::AppContext;

/// Reply to a submitted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The file was staged; the job still needs `missing`.
    Staged { missing: Vec<String> },
    /// The file completed the inputs and a task was started.
    Started { task_id: TaskId },
}

pub struct JobService {
    ctx: AppContext,
    intake: IntakeAccumulator,
    executor: Arc<PipelineExecutor>,
    running: Mutex<HashMap<TaskId, JoinHandle<TaskOutcome>>>,
}

impl JobService {
    pub fn new(ctx: AppContext) -> Self {
        let intake = IntakeAccumulator::new(ctx.store.clone(), ctx.config.storage.max_file_size);
        let executor = Arc::new(PipelineExecutor::new(ctx.pipeline.clone()));
        Self {
            ctx,
            intake,
            executor,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    // -- Submission -----------------------------------------------------------

    /// A file arrived from `user` in `chat`.
    ///
    /// Rejections (no job selected, wrong kind, a filled role, too large,
    /// not allowed, a task already running) leave the session untouched.
    pub fn on_file_received(
        &self,
        user: UserId,
        chat: ChatId,
        file: IncomingFile,
    ) -> mf_core::Result<Submission> {
        self.check_access(user, chat)?;
        self.submit(user, chat, file)
    }

    /// A link arrived from `user`. `name` decides the file kind.
    ///
    /// Only accepted when the user's download source is `url`.
    pub fn on_url_received(
        &self,
        user: UserId,
        chat: ChatId,
        url: &str,
        name: &str,
    ) -> mf_core::Result<Submission> {
        let prefs = self.check_access(user, chat)?;
        if prefs.download != DownloadSource::Url {
            return Err(PreconditionError::UrlInputDisabled.into());
        }
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PreconditionError::InvalidConfig(format!(
                "{url:?} is not an http(s) link"
            ))
            .into());
        }

        let file = IncomingFile {
            name: name.to_string(),
            // Unknown until the download starts.
            size: 0,
            source: InputSource::Url {
                url: url.to_string(),
            },
        };
        self.submit(user, chat, file)
    }

    fn submit(&self, user: UserId, chat: ChatId, file: IncomingFile) -> mf_core::Result<Submission> {
        self.ensure_idle(user)?;

        match self.intake.receive(user, &file)? {
            IntakeOutcome::NeedMore { staged, missing } => {
                self.emit_staged(&staged);
                Ok(Submission::Staged { missing })
            }
            IntakeOutcome::Ready { spec, inputs } => {
                if let Some(last) = inputs.last() {
                    self.emit_staged(last);
                }
                let task_id = self.start(user, chat, spec, inputs)?;
                Ok(Submission::Started { task_id })
            }
        }
    }

    /// Admit a task for the staged `inputs` and spawn its executor.
    fn start(
        &self,
        user: UserId,
        chat: ChatId,
        spec: JobSpec,
        inputs: Vec<StagedInput>,
    ) -> mf_core::Result<TaskId> {
        let preferences = self.ctx.store.load_session(user)?.preferences;
        let handle = self.ctx.admission.admit(user, chat, spec.kind())?;
        let task_id = handle.record.id;

        self.ctx.events.broadcast(
            EventCategory::User,
            EventPayload::TaskAdmitted {
                task_id,
                user_id: user,
                job_kind: spec.kind(),
            },
        );

        let job = TaskJob {
            handle,
            spec,
            inputs,
            preferences,
        };
        let executor = self.executor.clone();
        let join = tokio::spawn(async move { executor.run(job).await });

        let mut running = self.running.lock();
        running.retain(|_, h| !h.is_finished());
        running.insert(task_id, join);
        Ok(task_id)
    }

    // -- Selection and cancellation -------------------------------------------

    /// Select the job kind later files are staged toward.
    ///
    /// `config` is validated here, not when the task runs. Selecting drops
    /// any files staged for the previous selection.
    pub fn on_job_kind_selected(
        &self,
        user: UserId,
        chat: ChatId,
        kind: JobKind,
        config: Option<JobConfig>,
    ) -> mf_core::Result<()> {
        self.check_access(user, chat)?;
        if let Some(ref cfg) = config {
            if !cfg.matches(kind) {
                return Err(PreconditionError::InvalidConfig(format!(
                    "configuration does not belong to {kind}"
                ))
                .into());
            }
            cfg.validate()?;
        }
        self.ensure_idle(user)?;

        self.ctx.store.select_job(user, kind, config)?;
        tracing::debug!(user_id = %user, job_kind = %kind, "job kind selected");
        Ok(())
    }

    /// Cancel the user's active task and return the session to idle.
    ///
    /// Idempotent. Returns the cancelled task, if there was one.
    pub fn on_cancel_requested(&self, user: UserId) -> mf_core::Result<Option<TaskId>> {
        let cancelled = self.ctx.admission.cancel(user)?;
        self.ctx.store.reset_job(user)?;
        Ok(cancelled)
    }

    /// Drop the job selection and staged inputs. Refused while a task runs;
    /// use [`JobService::on_cancel_requested`] for that.
    pub fn reset(&self, user: UserId) -> mf_core::Result<()> {
        self.ensure_idle(user)?;
        self.ctx.store.clear_staged_inputs(user)?;
        self.ctx.store.reset_job(user)
    }

    // -- Preferences ----------------------------------------------------------

    pub fn preferences(&self, user: UserId) -> mf_core::Result<Preferences> {
        Ok(self.ctx.store.load_session(user)?.preferences)
    }

    pub fn set_preferences(&self, user: UserId, prefs: Preferences) -> mf_core::Result<()> {
        prefs.validate()?;
        self.ctx.store.update_preferences(user, &prefs)
    }

    // -- Administration -------------------------------------------------------

    /// Ban `user`, cancelling whatever they have running. Only admins may ban.
    pub fn ban(&self, actor: UserId, user: UserId) -> mf_core::Result<()> {
        self.require_admin(actor)?;
        self.ctx.store.set_banned(user, true)?;
        self.on_cancel_requested(user)?;
        tracing::info!(user_id = %user, by = %actor, "user banned");
        Ok(())
    }

    pub fn unban(&self, actor: UserId, user: UserId) -> mf_core::Result<()> {
        self.require_admin(actor)?;
        self.ctx.store.set_banned(user, false)?;
        tracing::info!(user_id = %user, by = %actor, "user unbanned");
        Ok(())
    }

    /// Fail every task a previous process left `pending` or `running`.
    /// Call once at startup, before accepting work.
    pub fn reset_orphaned_tasks(&self) -> mf_core::Result<usize> {
        let count = self.ctx.store.reset_orphaned()?;
        if count > 0 {
            tracing::warn!(count, "failed tasks orphaned by a previous run");
        }
        self.ctx
            .events
            .broadcast(EventCategory::Admin, EventPayload::OrphansReset { count });
        Ok(count)
    }

    /// User and task counts. Only admins may read them.
    pub fn stats(&self, actor: UserId) -> mf_core::Result<UsageStats> {
        self.require_admin(actor)?;
        self.ctx.store.stats()
    }

    // -- Queries --------------------------------------------------------------

    pub fn list_tasks(&self, user: UserId, limit: usize) -> mf_core::Result<Vec<TaskRecord>> {
        self.ctx.store.list_tasks(user, limit)
    }

    pub fn get_task(&self, id: TaskId) -> mf_core::Result<TaskRecord> {
        self.ctx.store.get_task(id)?.ok_or_else(|| Error::NotFound {
            entity: "task".into(),
            id: id.to_string(),
        })
    }

    // -- Event stream ---------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.ctx.events.subscribe()
    }

    /// Recent events of one task, oldest first.
    pub fn task_events(&self, id: TaskId) -> Vec<Event> {
        self.ctx.events.task_history(id)
    }

    /// Wait until task `id` has finished and return its final record.
    ///
    /// A task run by this process counts as finished once its terminal event
    /// was published, which happens after cleanup. Tasks with no executor
    /// here are judged by their stored status.
    pub async fn wait_for(&self, id: TaskId) -> mf_core::Result<TaskRecord> {
        let mut rx = self.subscribe();
        loop {
            if self.has_finished(id)? {
                return self.get_task(id);
            }
            match rx.recv().await {
                Ok(event) if event.payload.task_id() == Some(id) && event.payload.is_terminal() => {
                    return self.get_task(id);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(task_id = %id, skipped, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::Internal("event bus closed".into()));
                }
            }
        }
    }

    fn has_finished(&self, id: TaskId) -> mf_core::Result<bool> {
        if self
            .task_events(id)
            .iter()
            .any(|e| e.payload.is_terminal())
        {
            return Ok(true);
        }
        let executing = self
            .running
            .lock()
            .get(&id)
            .is_some_and(|h| !h.is_finished());
        Ok(!executing && self.get_task(id)?.status.is_terminal())
    }

    /// Cancel all running tasks and wait for their executors to clean up.
    pub async fn shutdown(&self) {
        self.ctx.admission.cancel_all();
        let handles: Vec<_> = self.running.lock().drain().collect();
        for (task_id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(task_id = %task_id, "executor panicked: {e}");
            }
        }
    }

    // -- Helpers --------------------------------------------------------------

    /// Refuse banned users and chats the policy does not allow. Returns the
    /// user's preferences on success.
    fn check_access(&self, user: UserId, chat: ChatId) -> mf_core::Result<Preferences> {
        let session = self.ctx.store.load_session(user)?;
        let admin = self.ctx.access.is_admin(user);
        if (session.banned && !admin) || !self.ctx.access.can_submit(user, chat) {
            tracing::debug!(user_id = %user, chat_id = %chat, "submission not allowed");
            return Err(PreconditionError::NotAllowed.into());
        }
        Ok(session.preferences)
    }

    fn require_admin(&self, actor: UserId) -> mf_core::Result<()> {
        if self.ctx.access.is_admin(actor) {
            Ok(())
        } else {
            Err(PreconditionError::NotAllowed.into())
        }
    }

    fn ensure_idle(&self, user: UserId) -> mf_core::Result<()> {
        match self.ctx.store.active_task(user)? {
            Some(task) => Err(Error::AlreadyRunning { task_id: task.id }),
            None => Ok(()),
        }
    }

    fn emit_staged(&self, input: &StagedInput) {
        self.ctx.events.broadcast(
            EventCategory::User,
            EventPayload::InputStaged {
                user_id: input.user_id,
                kind: input.kind,
                name: input.name.clone(),
            },
        );
    }
}
