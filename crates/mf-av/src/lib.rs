//! # mf-av
//!
//! External tool management and ffmpeg plumbing for the mediaforge pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with optional
//!   timeout and line-by-line stderr streaming.
//! - **Probing** ([`probe`]) -- ffprobe JSON into [`MediaProbe`], plus the
//!   plain-text media report.
//! - **Progress parsing** ([`FfmpegProgressParser`]) -- `-progress pipe:2`
//!   blocks into engine-time ticks.
//! - **Task workspaces** ([`TaskWorkspace`]) -- one directory per user and
//!   task for inputs and outputs.
//! - **Action builders** ([`actions`]) -- the ffmpeg argument list for each
//!   job kind, and the runner that executes them.

pub mod actions;
pub mod command;
pub mod probe;
pub mod progress;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use probe::{MediaProbe, StreamInfo};
pub use progress::{EngineProgress, FfmpegProgressParser};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::TaskWorkspace;
