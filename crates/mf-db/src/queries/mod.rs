//! Database query modules.

pub mod sessions;
pub mod staged_inputs;
pub mod tasks;
