//! Pipeline executor: acquire, transform and deliver one admitted task,
//! then clean up no matter how it ended.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use mf_av::TaskWorkspace;
use mf_core::events::{EventCategory, EventPayload};
use mf_core::{
    ConvertMode, DeliveryMode, Error, InputSource, JobSpec, OutputShape, Preferences, Stage,
    StagedInput, TaskOutcome, UploadTarget,
};

use crate::admission::TaskHandle;
use crate::context::{PipelineContext, ProgressSender};
use crate::endpoint::{AcquiredInput, TransformOutput, TransformRequest};
use crate::progress::ProgressReporter;

/// An admitted task with everything needed to run it.
#[derive(Debug, Clone)]
pub struct TaskJob {
    pub handle: TaskHandle,
    pub spec: JobSpec,
    /// Staged inputs in arrival order.
    pub inputs: Vec<StagedInput>,
    pub preferences: Preferences,
}

/// What the deliver stage produced.
#[derive(Debug)]
struct Delivered {
    name: String,
    link: Option<String>,
}

pub struct PipelineExecutor {
    ctx: PipelineContext,
}

impl PipelineExecutor {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Run `job` to a terminal state.
    ///
    /// Never returns an error: every failure becomes the task's outcome.
    /// On every path the working directory is removed and the task record is
    /// finished. Unless the task was cancelled (cancellation already reset
    /// the session), the user's staged inputs and job selection are cleared
    /// before the task record turns terminal.
    pub async fn run(&self, job: TaskJob) -> TaskOutcome {
        let record = &job.handle.record;
        let (task_id, user, chat) = (record.id, record.user_id, record.chat_id);

        let status = match self
            .ctx
            .endpoint
            .post_status(chat, &format!("{} queued", record.kind.descriptor().label))
            .await
        {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(task_id = %task_id, "could not post status message: {e}");
                None
            }
        };
        let reporter = ProgressReporter::start(
            task_id,
            self.ctx.tasks.clone(),
            self.ctx.events.clone(),
            self.ctx.endpoint.clone(),
            status,
            self.ctx.settings.progress_interval,
        );

        let result = match TaskWorkspace::create(&self.ctx.settings.work_dir, user, task_id) {
            Ok(workspace) => {
                let result = self.run_stages(&job, &workspace, &reporter).await;
                if let Err(e) = workspace.cleanup() {
                    tracing::warn!(task_id = %task_id, "workspace cleanup failed: {e}");
                }
                result
            }
            Err(e) => Err(e),
        };

        let mut outcome = match &result {
            Ok(_) => TaskOutcome::Completed,
            Err(Error::Cancelled) => TaskOutcome::Cancelled,
            Err(e) => TaskOutcome::Failed(e.to_string()),
        };

        // Reset the session while the task still blocks admission, so a
        // selection made right after the task ends is never wiped. The cancel
        // path resets the session itself.
        if outcome != TaskOutcome::Cancelled && !job.handle.cancel.is_cancelled() {
            if let Err(e) = self.ctx.sessions.clear_staged_inputs(user) {
                tracing::warn!(user_id = %user, "failed to clear staged inputs: {e}");
            }
            if let Err(e) = self.ctx.sessions.reset_job(user) {
                tracing::warn!(user_id = %user, "failed to reset job selection: {e}");
            }
        }

        let transitioned = match self.ctx.admission.complete(
            user,
            task_id,
            outcome.status(),
            outcome.error(),
        ) {
            Ok(transitioned) => transitioned,
            Err(e) => {
                tracing::error!(task_id = %task_id, "failed to finish task record: {e}");
                false
            }
        };
        // A cancel that landed after the last stage check still wins.
        if !transitioned && job.handle.cancel.is_cancelled() {
            outcome = TaskOutcome::Cancelled;
        }

        let final_text = match (&outcome, &result) {
            (TaskOutcome::Completed, Ok(delivered)) => {
                tracing::info!(task_id = %task_id, user_id = %user, "task completed");
                self.emit(EventPayload::TaskCompleted {
                    task_id,
                    link: delivered.link.clone(),
                });
                match &delivered.link {
                    Some(link) => format!("Done: {}\n{link}", delivered.name),
                    None => format!("Done: {}", delivered.name),
                }
            }
            (TaskOutcome::Failed(message), Err(e)) => {
                tracing::warn!(task_id = %task_id, user_id = %user, stage = ?e.stage(), "task failed: {message}");
                self.emit(EventPayload::TaskFailed {
                    task_id,
                    stage: e.stage().map(String::from),
                    error: message.clone(),
                });
                format!("Failed. {message}")
            }
            _ => {
                tracing::info!(task_id = %task_id, user_id = %user, "task cancelled");
                self.emit(EventPayload::TaskCancelled { task_id });
                "Cancelled.".to_string()
            }
        };
        reporter.finish(&final_text).await;

        outcome
    }

    async fn run_stages(
        &self,
        job: &TaskJob,
        workspace: &TaskWorkspace,
        reporter: &ProgressReporter,
    ) -> mf_core::Result<Delivered> {
        let task_id = job.handle.record.id;
        if !self.ctx.tasks.mark_running(task_id)? {
            // Cancelled between admission and start.
            return Err(Error::Cancelled);
        }

        self.enter(job, Stage::Acquiring, reporter).await?;
        let acquired = self.acquire(job, workspace, reporter).await?;

        self.enter(job, Stage::Transforming, reporter).await?;
        let output = self.transform(job, workspace, acquired, reporter).await?;
        if job.handle.cancel.is_cancelled() {
            tracing::info!(task_id = %task_id, "discarding output of cancelled task");
            return Err(Error::Cancelled);
        }

        self.enter(job, Stage::Delivering, reporter).await?;
        self.deliver(job, &output, reporter).await
    }

    /// Check for cancellation, then record and announce the stage.
    async fn enter(
        &self,
        job: &TaskJob,
        stage: Stage,
        reporter: &ProgressReporter,
    ) -> mf_core::Result<()> {
        if job.handle.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let task_id = job.handle.record.id;
        tracing::info!(task_id = %task_id, stage = %stage, "entering stage");
        if let Err(e) = self.ctx.tasks.set_stage(task_id, stage) {
            tracing::warn!(task_id = %task_id, "failed to record stage: {e}");
        }
        self.emit(EventPayload::TaskStageChanged { task_id, stage });
        reporter.announce(stage_title(stage)).await;
        Ok(())
    }

    // -- Acquire --------------------------------------------------------------

    async fn acquire(
        &self,
        job: &TaskJob,
        workspace: &TaskWorkspace,
        reporter: &ProgressReporter,
    ) -> mf_core::Result<Vec<AcquiredInput>> {
        let total = job.inputs.len();
        let mut acquired = Vec::with_capacity(total);

        for (index, input) in job.inputs.iter().enumerate() {
            if job.handle.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let dest = workspace.input_path(index, &input.name);
            let progress = reporter.part_sender(
                Stage::Acquiring,
                format!("Downloading {}/{total}: {}", index + 1, input.name),
                index,
                total,
            );
            let bytes = self.fetch_with_retry(input, &dest, &progress).await?;
            tracing::debug!(task_id = %job.handle.record.id, name = %input.name, bytes, "input acquired");

            acquired.push(AcquiredInput {
                kind: input.kind,
                name: input.name.clone(),
                path: dest,
            });
        }
        Ok(acquired)
    }

    async fn fetch_with_retry(
        &self,
        input: &StagedInput,
        dest: &Path,
        progress: &ProgressSender,
    ) -> mf_core::Result<u64> {
        let settings = &self.ctx.settings;
        let attempts = settings.acquire_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = with_timeout(settings.acquire_timeout, self.fetch_once(input, dest, progress))
                .await
                .unwrap_or_else(|| {
                    Err(Error::acquire(
                        &input.name,
                        format!("timed out after {:?}", settings.acquire_timeout),
                    ))
                });

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < attempts => {
                    tracing::warn!(name = %input.name, attempt, "fetch failed, retrying: {e}");
                    tokio::time::sleep(settings.retry_backoff * attempt).await;
                }
                Err(e @ Error::Acquire { .. }) => return Err(e),
                Err(e) => return Err(Error::acquire(&input.name, e.to_string())),
            }
        }
    }

    async fn fetch_once(
        &self,
        input: &StagedInput,
        dest: &Path,
        progress: &ProgressSender,
    ) -> mf_core::Result<u64> {
        match &input.source {
            InputSource::Endpoint {
                chat_id,
                message_id,
                file_ref,
            } => {
                self.ctx
                    .endpoint
                    .fetch_file(*chat_id, *message_id, file_ref, dest, progress)
                    .await
            }
            InputSource::Url { url } => self.ctx.fetcher.fetch(url, dest, progress).await,
        }
    }

    // -- Transform ------------------------------------------------------------

    async fn transform(
        &self,
        job: &TaskJob,
        workspace: &TaskWorkspace,
        inputs: Vec<AcquiredInput>,
        reporter: &ProgressReporter,
    ) -> mf_core::Result<TransformOutput> {
        let kind = job.spec.kind();
        let name = output_name(job);
        let request = TransformRequest {
            spec: job.spec.clone(),
            inputs,
            output: workspace.output_path(&name),
            container: job.preferences.container,
            scratch_dir: workspace.dir().to_path_buf(),
        };

        let progress = reporter.sender(Stage::Transforming, kind.descriptor().label);
        let output = self
            .ctx
            .engine
            .run(request, &progress)
            .await
            .map_err(|e| match e {
                Error::Transform { .. } | Error::Tool { .. } | Error::Probe(_) | Error::Cancelled => e,
                other => Error::transform(other.to_string()),
            })?;

        if !output.path.is_file() {
            return Err(Error::transform(format!(
                "engine reported success but {} was not produced",
                output.path.display()
            )));
        }
        Ok(output)
    }

    // -- Deliver --------------------------------------------------------------

    async fn deliver(
        &self,
        job: &TaskJob,
        output: &TransformOutput,
        reporter: &ProgressReporter,
    ) -> mf_core::Result<Delivered> {
        let name = output
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| output_name(job));
        let chat = job.handle.record.chat_id;
        let limit = self.ctx.settings.deliver_timeout;
        let progress = reporter.sender(Stage::Delivering, format!("Uploading {name}"));

        // Reports always go back through the chat.
        let target = match output.report {
            Some(_) => UploadTarget::Messaging,
            None => job.preferences.upload,
        };

        match target {
            UploadTarget::Messaging => {
                let mode = delivery_mode(job);
                let sent = with_timeout(
                    limit,
                    self.ctx
                        .endpoint
                        .send_result(
                            chat,
                            &output.path,
                            mode,
                            job.preferences.thumbnail.as_deref(),
                            &name,
                            &progress,
                        ),
                )
                .await;
                finish_delivery(sent, "messaging", limit)?;
                Ok(Delivered { name, link: None })
            }
            UploadTarget::ObjectStorage => {
                let uploaded =
                    with_timeout(limit, self.ctx.storage.upload_file(&output.path, &progress))
                        .await;
                let link = finish_delivery(uploaded, "object storage", limit)?;
                Ok(Delivered {
                    name,
                    link: Some(link),
                })
            }
        }
    }

    fn emit(&self, payload: EventPayload) {
        self.ctx.events.broadcast(EventCategory::User, payload);
    }
}

fn finish_delivery(
    result: Option<mf_core::Result<String>>,
    target: &str,
    limit: Duration,
) -> mf_core::Result<String> {
    match result {
        None => Err(Error::deliver(target, format!("timed out after {limit:?}"))),
        Some(Ok(reference)) => Ok(reference),
        Some(Err(e @ Error::Deliver { .. })) => Err(e),
        Some(Err(e)) => Err(Error::deliver(target, e.to_string())),
    }
}

/// Await `fut`, giving up after `limit`. A zero limit waits forever.
async fn with_timeout<T>(limit: Duration, fut: impl Future<Output = T>) -> Option<T> {
    if limit.is_zero() {
        return Some(fut.await);
    }
    tokio::time::timeout(limit, fut).await.ok()
}

fn delivery_mode(job: &TaskJob) -> DeliveryMode {
    match job.spec {
        JobSpec::Convert {
            mode: ConvertMode::ToDocument,
        } => DeliveryMode::Document,
        JobSpec::Convert {
            mode: ConvertMode::ToStream,
        } => DeliveryMode::Stream,
        JobSpec::MediaInfo => DeliveryMode::Document,
        _ => job.preferences.delivery,
    }
}

/// Name the output is delivered under.
fn output_name(job: &TaskJob) -> String {
    let kind = job.spec.kind();
    let original = job
        .inputs
        .iter()
        .find(|i| i.kind == mf_core::FileKind::Video)
        .or_else(|| job.inputs.first())
        .map(|i| i.name.as_str())
        .unwrap_or("output");
    let stem = original
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(original);

    let ext = match kind.descriptor().output {
        OutputShape::Report => "txt",
        OutputShape::Media => job.preferences.container.extension(),
    };
    let fallback = format!("{stem}_{kind}");
    job.preferences
        .render_filename(original, &fallback, ext, Utc::now())
}

fn stage_title(stage: Stage) -> &'static str {
    match stage {
        Stage::Acquiring => "Downloading inputs...",
        Stage::Transforming => "Processing...",
        Stage::Delivering => "Uploading result...",
    }
}
