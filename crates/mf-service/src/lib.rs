//! # mf-service
//!
//! Wires the pipeline core to its collaborators and exposes the entry points
//! a transport calls into:
//!
//! - **[`JobService`]**: `on_file_received`, `on_url_received`,
//!   `on_job_kind_selected`, `on_cancel_requested`, preferences, admin
//!   operations and the task event stream.
//! - **[`AppContext`]**: shared infrastructure (store, tools, event bus,
//!   pipeline context).
//! - **[`AccessPolicy`]**: who may submit work where.
//! - Production collaborators: [`GofileClient`] (object storage),
//!   [`HttpFetcher`] (link inputs) and [`LocalEndpoint`] (a filesystem
//!   stand-in for the chat transport used by the CLI).

pub mod access;
pub mod context;
pub mod gofile;
pub mod http;
pub mod local;
pub mod service;

pub use access::AccessPolicy;
pub use context::{AppContext, Collaborators};
pub use gofile::GofileClient;
pub use http::HttpFetcher;
pub use local::LocalEndpoint;
pub use service::{JobService, Submission};
