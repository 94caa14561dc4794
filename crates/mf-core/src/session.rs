//! Session, staged-input, and task record shapes.
//!
//! These are the records the session/task store persists. A [`Session`]
//! exists per principal and carries the selected job kind, its
//! configuration, and long-lived [`Preferences`]. Files received toward the
//! selected job become [`StagedInput`]s until a task drains them. Each
//! admitted job is tracked by a [`TaskRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PreconditionError;
use crate::ids::{ChatId, StagedInputId, TaskId, UserId};
use crate::job::{JobConfig, JobKind};
use crate::media::{Container, FileKind};

/// Longest accepted filename template.
pub const MAX_FILENAME_TEMPLATE_LEN: usize = 100;

/// Template value that keeps the generated default name.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "default";

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// How a media result is sent back through the messaging endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Document,
    Stream,
}

/// Where finished outputs are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadTarget {
    #[default]
    Messaging,
    ObjectStorage,
}

/// Where inputs are expected to come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadSource {
    #[default]
    Messaging,
    Url,
}

/// Long-lived per-user settings that survive job resets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub container: Container,
    pub delivery: DeliveryMode,
    pub upload: UploadTarget,
    pub download: DownloadSource,
    /// Endpoint reference of a custom thumbnail, handed to the endpoint with
    /// every delivered result.
    pub thumbnail: Option<String>,
    /// `default`, or a template using `{original}` and `{time}`.
    pub filename_template: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            container: Container::default(),
            delivery: DeliveryMode::default(),
            upload: UploadTarget::default(),
            download: DownloadSource::default(),
            thumbnail: None,
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
        }
    }
}

impl Preferences {
    pub fn validate(&self) -> Result<(), PreconditionError> {
        let template = self.filename_template.trim();
        if template.is_empty() {
            return Err(PreconditionError::InvalidConfig(
                "filename template cannot be empty".into(),
            ));
        }
        if template.chars().count() > MAX_FILENAME_TEMPLATE_LEN {
            return Err(PreconditionError::InvalidConfig(format!(
                "filename template is longer than {MAX_FILENAME_TEMPLATE_LEN} characters"
            )));
        }
        if template.contains(['/', '\\']) {
            return Err(PreconditionError::InvalidConfig(
                "filename template cannot contain path separators".into(),
            ));
        }
        if self.thumbnail.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(PreconditionError::InvalidConfig(
                "thumbnail reference cannot be empty".into(),
            ));
        }
        Ok(())
    }

    /// Build the delivered file name for an output.
    ///
    /// `original` is the name of the first input, `fallback_stem` the name
    /// used with the `default` template, and `ext` the output extension.
    pub fn render_filename(
        &self,
        original: &str,
        fallback_stem: &str,
        ext: &str,
        now: DateTime<Utc>,
    ) -> String {
        let original_stem = original
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(original);

        let template = self.filename_template.trim();
        let stem = if template.is_empty() || template == DEFAULT_FILENAME_TEMPLATE {
            fallback_stem.to_string()
        } else {
            template
                .replace("{original}", original_stem)
                .replace("{time}", &now.format("%Y%m%d_%H%M%S").to_string())
        };

        format!("{stem}.{ext}")
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Per-principal session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub job_kind: Option<JobKind>,
    pub job_config: Option<JobConfig>,
    pub preferences: Preferences,
    pub banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh idle session.
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            job_kind: None,
            job_config: None,
            preferences: Preferences::default(),
            banned: false,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Where a file can be fetched from later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSource {
    /// A message attachment held by the messaging endpoint.
    Endpoint {
        chat_id: ChatId,
        message_id: i64,
        file_ref: String,
    },
    /// A direct HTTP(S) link.
    Url { url: String },
}

/// Descriptor of a file as it arrives from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingFile {
    pub name: String,
    /// Size in bytes, when the transport knows it.
    pub size: u64,
    pub source: InputSource,
}

/// A file received toward the selected job, not yet consumed by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedInput {
    pub id: StagedInputId,
    pub user_id: UserId,
    pub kind: FileKind,
    pub name: String,
    pub size: u64,
    pub source: InputSource,
    /// Arrival order within the session.
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Lifecycle status of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Pipeline stage a running task is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquiring,
    Transforming,
    Delivering,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Acquiring => "acquiring",
            Stage::Transforming => "transforming",
            Stage::Delivering => "delivering",
        }
    }

    /// Share of overall task progress covered by this stage, as `[start, end)`.
    pub fn progress_band(self) -> (f32, f32) {
        match self {
            Stage::Acquiring => (0.0, 30.0),
            Stage::Transforming => (30.0, 90.0),
            Stage::Delivering => (90.0, 100.0),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acquiring" => Ok(Stage::Acquiring),
            "transforming" => Ok(Stage::Transforming),
            "delivering" => Ok(Stage::Delivering),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// One admitted, tracked execution of a job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: JobKind,
    pub status: TaskStatus,
    pub stage: Option<Stage>,
    /// Overall progress, 0.0 to 100.0. Never decreases.
    pub progress: f32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed => TaskStatus::Completed,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
            TaskOutcome::Cancelled => TaskStatus::Cancelled,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TaskOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Counts shown to administrators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_users: u64,
    pub banned_users: u64,
    pub pending_tasks: u64,
    pub running_tasks: u64,
}

impl UsageStats {
    /// Users that are not banned.
    pub fn active_users(&self) -> u64 {
        self.total_users.saturating_sub(self.banned_users)
    }
}
