//! mf-db: SQLite persistence for sessions, staged inputs and tasks.
//!
//! This crate provides a pooled SQLite database with embedded migrations,
//! row decoding into the mf-core record shapes, per-table query modules, and
//! [`SqliteStore`], which implements the mf-core store traits on top of them.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
pub mod store;

pub use pool::{init_memory_pool, init_pool, DbPool};
pub use store::SqliteStore;
