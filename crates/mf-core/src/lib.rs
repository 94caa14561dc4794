//! mf-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other mf-* crates. It
//! owns the file classifier, the job-kind registry, the session and task
//! record shapes together with the store traits that persist them, the
//! application configuration, and a broadcast event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod media;
pub mod session;
pub mod store;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, PreconditionError, Result};
pub use ids::*;
pub use job::*;
pub use media::*;
pub use session::*;
pub use store::{SessionStore, TaskStore};
