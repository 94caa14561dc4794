//! Shared execution context and the progress tick plumbing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mf_core::config::Config;
use mf_core::events::EventBus;
use mf_core::{SessionStore, TaskStore};

use crate::admission::TaskAdmission;
use crate::endpoint::{MessagingEndpoint, ObjectStorage, RemoteFetcher, TransformEngine};

/// What a [`ProgressTick`] counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Bytes,
    /// Seconds of media produced by the engine.
    Seconds,
}

/// One raw progress observation from a stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressTick {
    pub done: f64,
    /// `None` when the total is unknown; the tick still counts as liveness.
    pub total: Option<f64>,
    pub unit: ProgressUnit,
}

impl ProgressTick {
    pub fn bytes(done: u64, total: Option<u64>) -> Self {
        Self {
            done: done as f64,
            total: total.map(|t| t as f64),
            unit: ProgressUnit::Bytes,
        }
    }

    pub fn seconds(done: f64, total: Option<f64>) -> Self {
        Self {
            done,
            total,
            unit: ProgressUnit::Seconds,
        }
    }

    /// Completion of the current stage, 0.0 to 1.0, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0.0 => Some((self.done / total).clamp(0.0, 1.0)),
            _ => None,
        }
    }
}

/// Sender for reporting progress from within stages.
///
/// Wraps a callback so collaborators never see the reporter behind it.
pub struct ProgressSender {
    callback: Box<dyn Fn(ProgressTick) + Send + Sync>,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(ProgressTick) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Report progress.
    pub fn send(&self, tick: ProgressTick) {
        (self.callback)(tick);
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// Tunables the executor reads on every task.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Root of the per-user-per-task working directories.
    pub work_dir: PathBuf,
    pub acquire_timeout: Duration,
    /// Extra attempts after the first failed fetch.
    pub acquire_retries: u32,
    pub retry_backoff: Duration,
    pub deliver_timeout: Duration,
    /// Minimum gap between two status updates.
    pub progress_interval: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_dir: config.storage.work_dir.clone(),
            acquire_timeout: config.pipeline.acquire_timeout(),
            acquire_retries: config.pipeline.acquire_retries,
            retry_backoff: config.pipeline.retry_backoff(),
            deliver_timeout: config.pipeline.deliver_timeout(),
            progress_interval: config.pipeline.progress_interval(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a pipeline run needs, shared by all tasks.
#[derive(Clone)]
pub struct PipelineContext {
    pub sessions: Arc<dyn SessionStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub admission: Arc<TaskAdmission>,
    pub endpoint: Arc<dyn MessagingEndpoint>,
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub storage: Arc<dyn ObjectStorage>,
    pub engine: Arc<dyn TransformEngine>,
    pub events: Arc<EventBus>,
    pub settings: PipelineSettings,
}
