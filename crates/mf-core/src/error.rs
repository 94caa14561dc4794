//! Unified error type for mediaforge.
//!
//! All crates funnel their failures into [`Error`]. User-facing rejections
//! that happen before a task exists are grouped under
//! [`PreconditionError`]; the three pipeline stages each have their own
//! terminal variant so the final status report can name the stage that failed.

use std::fmt;

use crate::ids::TaskId;
use crate::job::JobKind;
use crate::media::FileKind;

/// A request was rejected before any task was created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("no tool selected; pick one before sending files")]
    NoJobSelected,

    #[error("{kind} needs to be configured before sending files")]
    ConfigureFirst { kind: JobKind },

    #[error("a {kind} file is not accepted here; expected {}", join_kinds(.expected))]
    WrongInputKind {
        kind: FileKind,
        expected: Vec<FileKind>,
    },

    #[error("the {role} is already staged{}", still_missing(.missing))]
    DuplicateRole { role: String, missing: Vec<String> },

    #[error("file is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("link inputs are disabled; switch the download source to url first")]
    UrlInputDisabled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("not allowed to submit work here")]
    NotAllowed,
}

fn still_missing(missing: &[String]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!("; still missing: {}", missing.join(", "))
    }
}

fn join_kinds(kinds: &[FileKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Unified error type covering all failure modes in mediaforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected before any task was created.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// The user already has a pending or running task.
    #[error("a task is already running ({task_id}); wait for it or cancel it")]
    AlreadyRunning {
        /// The task that blocks admission.
        task_id: TaskId,
    },

    /// Fetching an input failed after all retries.
    #[error("Acquire failed [{input}]: {message}")]
    Acquire {
        /// Name of the input that could not be fetched.
        input: String,
        /// Human-readable error description.
        message: String,
    },

    /// The transform engine failed or produced no output.
    #[error("Transform failed: {message}")]
    Transform {
        /// Human-readable error description.
        message: String,
    },

    /// Handing the result to its delivery target failed.
    #[error("Deliver failed [{target}]: {message}")]
    Deliver {
        /// Delivery target ("messaging" or "object_storage").
        target: String,
        /// Human-readable error description.
        message: String,
    },

    /// A status message could not be posted or edited.
    #[error("Status update failed: {0}")]
    StatusSink(String),

    /// The task observed a cancellation request.
    #[error("Task was cancelled")]
    Cancelled,

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "task").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Name of the pipeline stage this error terminates, if any.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Error::Acquire { .. } => Some("acquire"),
            Error::Transform { .. } | Error::Tool { .. } | Error::Probe(_) => Some("transform"),
            Error::Deliver { .. } => Some("deliver"),
            _ => None,
        }
    }

    /// Whether the error should be shown to the user verbatim as a reply.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Error::Precondition(_) | Error::AlreadyRunning { .. })
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Acquire`].
    pub fn acquire(input: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Acquire {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Transform`].
    pub fn transform(message: impl Into<String>) -> Self {
        Error::Transform {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Deliver`].
    pub fn deliver(target: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Deliver {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
