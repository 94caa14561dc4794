//! In-memory collaborators for the pipeline's unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mf_core::{ChatId, DeliveryMode, Error};
use parking_lot::Mutex;

use crate::context::{ProgressSender, ProgressTick};
use crate::endpoint::{
    MessagingEndpoint, ObjectStorage, RemoteFetcher, StatusRef, TransformEngine, TransformOutput,
    TransformRequest,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub chat_id: ChatId,
    pub file_name: String,
    pub mode: DeliveryMode,
    pub thumbnail: Option<String>,
    pub caption: String,
}

#[derive(Default)]
pub struct FakeEndpoint {
    /// Number of fetches that fail before one succeeds.
    pub fetch_failures: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub fail_send: bool,
    pub fail_status: bool,
    pub(crate) next_status: AtomicI64,
    pub(crate) statuses: Mutex<Vec<String>>,
    pub(crate) sent: Mutex<Vec<Sent>>,
}

impl FakeEndpoint {
    pub fn failing_status() -> Self {
        Self {
            fail_status: true,
            ..Default::default()
        }
    }

    pub fn status_updates(&self) -> Vec<String> {
        self.statuses.lock().clone()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MessagingEndpoint for FakeEndpoint {
    async fn fetch_file(
        &self,
        _chat_id: ChatId,
        _message_id: i64,
        file_ref: &str,
        dest: &Path,
        progress: &ProgressSender,
    ) -> mf_core::Result<u64> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fetch_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fetch_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::acquire(file_ref, "connection reset"));
        }
        let data = format!("data:{file_ref}");
        std::fs::write(dest, &data)?;
        let len = data.len() as u64;
        progress.send(ProgressTick::bytes(len, Some(len)));
        Ok(len)
    }

    async fn send_result(
        &self,
        chat_id: ChatId,
        file: &Path,
        mode: DeliveryMode,
        thumbnail: Option<&str>,
        caption: &str,
        _progress: &ProgressSender,
    ) -> mf_core::Result<String> {
        if self.fail_send {
            return Err(Error::deliver("messaging", "upload rejected"));
        }
        if !file.exists() {
            return Err(Error::deliver("messaging", "file vanished"));
        }
        let mut sent = self.sent.lock();
        sent.push(Sent {
            chat_id,
            file_name: file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            mode,
            thumbnail: thumbnail.map(String::from),
            caption: caption.to_string(),
        });
        Ok(format!("msg-{}", sent.len()))
    }

    async fn post_status(&self, chat_id: ChatId, text: &str) -> mf_core::Result<StatusRef> {
        self.statuses.lock().push(text.to_string());
        Ok(StatusRef {
            chat_id,
            message_id: self.next_status.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn update_status(&self, _status: &StatusRef, text: &str) -> mf_core::Result<()> {
        if self.fail_status {
            return Err(Error::StatusSink("message to edit not found".into()));
        }
        self.statuses.lock().push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub calls: AtomicUsize,
}

#[async_trait]
impl RemoteFetcher for FakeFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        _progress: &ProgressSender,
    ) -> mf_core::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(dest, url)?;
        Ok(url.len() as u64)
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub fail: bool,
    pub uploads: AtomicUsize,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload_file(&self, path: &Path, _progress: &ProgressSender) -> mf_core::Result<String> {
        if self.fail {
            return Err(Error::deliver("object storage", "server said no"));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(format!("https://files.example/{name}"))
    }
}

/// Engine that concatenates its inputs into the output.
#[derive(Default)]
pub struct FakeEngine {
    pub fail: bool,
    /// Skip writing the output while still reporting success.
    pub no_output: bool,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<TransformRequest>>,
}

#[async_trait]
impl TransformEngine for FakeEngine {
    async fn run(
        &self,
        request: TransformRequest,
        progress: &ProgressSender,
    ) -> mf_core::Result<TransformOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::tool("ffmpeg", "Unknown encoder 'libnope'"));
        }
        progress.send(ProgressTick::seconds(5.0, Some(10.0)));
        if !self.no_output {
            let mut joined = Vec::new();
            for input in &request.inputs {
                joined.extend(std::fs::read(&input.path)?);
            }
            std::fs::write(&request.output, joined)?;
        }
        progress.send(ProgressTick::seconds(10.0, Some(10.0)));
        Ok(TransformOutput {
            path: request.output,
            report: None,
        })
    }
}
