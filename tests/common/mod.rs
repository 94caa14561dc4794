//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`JobService`] over an in-memory
//! database, the filesystem endpoint, and a fake transform engine that
//! concatenates its inputs instead of running ffmpeg.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mf_core::config::Config;
use mf_core::{ChatId, Error, IncomingFile, InputSource, JobSpec, UserId};
use mf_db::init_memory_pool;
use mf_pipeline::{
    ObjectStorage, ProgressSender, ProgressTick, RemoteFetcher, TransformEngine, TransformOutput,
    TransformRequest,
};
use mf_service::{AppContext, Collaborators, JobService, LocalEndpoint};
use tempfile::TempDir;

/// Concatenates inputs into the output; writes a short report for media info.
#[derive(Default)]
pub struct ConcatEngine {
    pub fail_with: Option<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TransformEngine for ConcatEngine {
    async fn run(
        &self,
        request: TransformRequest,
        progress: &ProgressSender,
    ) -> mf_core::Result<TransformOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.fail_with {
            return Err(Error::tool("ffmpeg", message.clone()));
        }

        if request.spec == JobSpec::MediaInfo {
            let name = &request.inputs[0].name;
            let report = format!("Media Information\n\nFile: {name}\n");
            std::fs::write(&request.output, &report)?;
            return Ok(TransformOutput {
                path: request.output,
                report: Some(report),
            });
        }

        let mut data = Vec::new();
        for (i, input) in request.inputs.iter().enumerate() {
            data.extend(std::fs::read(&input.path)?);
            progress.send(ProgressTick::seconds((i + 1) as f64, Some(request.inputs.len() as f64)));
        }
        std::fs::write(&request.output, data)?;
        Ok(TransformOutput {
            path: request.output,
            report: None,
        })
    }
}

pub struct OfflineFetcher;

#[async_trait]
impl RemoteFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str, _: &Path, _: &ProgressSender) -> mf_core::Result<u64> {
        Err(Error::acquire(url, "network disabled in tests"))
    }
}

pub struct OfflineStorage;

#[async_trait]
impl ObjectStorage for OfflineStorage {
    async fn upload_file(&self, _: &Path, _: &ProgressSender) -> mf_core::Result<String> {
        Err(Error::deliver("object storage", "network disabled in tests"))
    }
}

pub struct TestHarness {
    pub service: JobService,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_parts(ConcatEngine::default(), Arc::new(OfflineStorage))
    }

    pub fn with_engine(engine: ConcatEngine) -> Self {
        Self::with_parts(engine, Arc::new(OfflineStorage))
    }

    pub fn with_parts(engine: ConcatEngine, storage: Arc<dyn ObjectStorage>) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.storage.work_dir = dir.path().join("work");
        config.access.allow_private = true;
        config.pipeline.retry_backoff_ms = 0;
        config.pipeline.progress_interval_ms = 5;

        let ctx = AppContext::new(
            config,
            init_memory_pool().expect("failed to create in-memory pool"),
            Collaborators {
                endpoint: Arc::new(LocalEndpoint::new(dir.path().join("outbox"))),
                fetcher: Arc::new(OfflineFetcher),
                storage,
                engine: Arc::new(engine),
            },
        );
        Self {
            service: JobService::new(ctx),
            dir,
        }
    }

    /// Create a local file with `contents` and describe it as an attachment.
    pub fn attachment(&self, chat: ChatId, name: &str, contents: &[u8]) -> IncomingFile {
        let inbox = self.dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).expect("failed to create inbox");
        let path = inbox.join(name);
        std::fs::write(&path, contents).expect("failed to write attachment");
        IncomingFile {
            name: name.to_string(),
            size: contents.len() as u64,
            source: InputSource::Endpoint {
                chat_id: chat,
                message_id: 1,
                file_ref: path.to_string_lossy().to_string(),
            },
        }
    }

    pub fn delivered(&self, chat: ChatId, name: &str) -> PathBuf {
        self.dir
            .path()
            .join("outbox")
            .join(chat.to_string())
            .join(name)
    }

    /// Task directories still present under the work root.
    pub fn leftover_workspaces(&self, user: UserId) -> usize {
        std::fs::read_dir(self.dir.path().join("work").join(user.to_string()))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
