//! Collaborators the pipeline consumes.
//!
//! The transport, the transform engine and the object-storage target are
//! all outside the core; these traits are the whole contract with them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mf_core::{ChatId, Container, DeliveryMode, FileKind, JobSpec};

use crate::context::ProgressSender;

/// Handle to a posted status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// The chat transport, seen from the pipeline.
#[async_trait]
pub trait MessagingEndpoint: Send + Sync {
    /// Download the attachment identified by `file_ref` to `dest`, returning
    /// the number of bytes written.
    async fn fetch_file(
        &self,
        chat_id: ChatId,
        message_id: i64,
        file_ref: &str,
        dest: &Path,
        progress: &ProgressSender,
    ) -> mf_core::Result<u64>;

    /// Send a produced file back to `chat_id`. Returns a delivery reference.
    async fn send_result(
        &self,
        chat_id: ChatId,
        file: &Path,
        mode: DeliveryMode,
        thumbnail: Option<&str>,
        caption: &str,
        progress: &ProgressSender,
    ) -> mf_core::Result<String>;

    async fn post_status(&self, chat_id: ChatId, text: &str) -> mf_core::Result<StatusRef>;

    /// Edit a status message. May fail when the message is gone; callers
    /// log and move on.
    async fn update_status(&self, status: &StatusRef, text: &str) -> mf_core::Result<()>;
}

/// Downloads inputs given as links.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path, progress: &ProgressSender)
        -> mf_core::Result<u64>;
}

/// Remote upload target returning a public link.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload_file(&self, path: &Path, progress: &ProgressSender) -> mf_core::Result<String>;
}

/// A staged input after the acquire stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredInput {
    pub kind: FileKind,
    pub name: String,
    pub path: PathBuf,
}

/// One transform invocation.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub spec: JobSpec,
    /// Inputs in arrival order.
    pub inputs: Vec<AcquiredInput>,
    /// Where the engine must write its result.
    pub output: PathBuf,
    pub container: Container,
    /// Directory for auxiliary files (concat lists and the like).
    pub scratch_dir: PathBuf,
}

impl TransformRequest {
    /// First input of `kind`.
    pub fn input_of(&self, kind: FileKind) -> Option<&AcquiredInput> {
        self.inputs.iter().find(|i| i.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub path: PathBuf,
    /// Text report for report-shaped jobs.
    pub report: Option<String>,
}

/// The external transformation engine.
#[async_trait]
pub trait TransformEngine: Send + Sync {
    async fn run(
        &self,
        request: TransformRequest,
        progress: &ProgressSender,
    ) -> mf_core::Result<TransformOutput>;
}
