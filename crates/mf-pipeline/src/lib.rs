//! # mf-pipeline
//!
//! The job pipeline core.
//!
//! - **[`IntakeAccumulator`]** stages incoming files toward the selected job
//!   kind and reports when its input requirements are met.
//! - **[`TaskAdmission`]** enforces one active task per user and hands out
//!   cancellation tokens.
//! - **[`PipelineExecutor`]** runs acquire, transform and deliver for an
//!   admitted task and always cleans up afterwards.
//! - **[`ProgressReporter`]** turns raw progress ticks into rate-limited
//!   status updates.
//! - The collaborator traits in [`endpoint`] describe everything the core
//!   consumes from the outside; [`FfmpegEngine`] is the production
//!   [`TransformEngine`].

pub mod admission;
pub mod context;
pub mod endpoint;
pub mod engine;
pub mod executor;
pub mod intake;
pub mod progress;

#[cfg(test)]
mod fakes;

pub use admission::{TaskAdmission, TaskHandle};
pub use context::{PipelineContext, PipelineSettings, ProgressSender, ProgressTick, ProgressUnit};
pub use endpoint::{
    AcquiredInput, MessagingEndpoint, ObjectStorage, RemoteFetcher, StatusRef, TransformEngine,
    TransformOutput, TransformRequest,
};
pub use engine::FfmpegEngine;
pub use executor::{PipelineExecutor, TaskJob};
pub use intake::{evaluate, IntakeAccumulator, IntakeOutcome, Verdict};
pub use progress::{format_size, format_time, progress_bar, ProgressReporter};
