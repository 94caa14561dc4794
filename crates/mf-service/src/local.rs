//! Filesystem-backed messaging endpoint.
//!
//! Stands in for a chat transport when running from the command line:
//! attachments are local paths, results are copied into an outbox directory,
//! and status messages go to the log.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use mf_core::{ChatId, DeliveryMode, Error};
use mf_pipeline::{MessagingEndpoint, ProgressSender, ProgressTick, StatusRef};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const CHUNK_SIZE: usize = 256 * 1024;

pub struct LocalEndpoint {
    outbox: PathBuf,
    next_message: AtomicI64,
}

impl LocalEndpoint {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
            next_message: AtomicI64::new(1),
        }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }
}

/// Copy `src` to `dest` in chunks, reporting bytes written.
async fn copy_with_progress(
    src: &Path,
    dest: &Path,
    progress: &ProgressSender,
) -> std::io::Result<u64> {
    let mut reader = tokio::fs::File::open(src).await?;
    let total = reader.metadata().await?.len();
    let mut writer = tokio::fs::File::create(dest).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        copied += n as u64;
        progress.send(ProgressTick::bytes(copied, Some(total)));
    }
    writer.flush().await?;
    Ok(copied)
}

#[async_trait]
impl MessagingEndpoint for LocalEndpoint {
    async fn fetch_file(
        &self,
        _chat_id: ChatId,
        _message_id: i64,
        file_ref: &str,
        dest: &Path,
        progress: &ProgressSender,
    ) -> mf_core::Result<u64> {
        copy_with_progress(Path::new(file_ref), dest, progress)
            .await
            .map_err(|e| Error::acquire(file_ref, e.to_string()))
    }

    async fn send_result(
        &self,
        chat_id: ChatId,
        file: &Path,
        mode: DeliveryMode,
        thumbnail: Option<&str>,
        caption: &str,
        progress: &ProgressSender,
    ) -> mf_core::Result<String> {
        let name = file
            .file_name()
            .ok_or_else(|| Error::deliver("messaging", format!("{} has no file name", file.display())))?;
        let dir = self.outbox.join(chat_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::deliver("messaging", format!("cannot create outbox: {e}")))?;
        let dest = dir.join(name);
        copy_with_progress(file, &dest, progress)
            .await
            .map_err(|e| Error::deliver("messaging", e.to_string()))?;

        tracing::info!(
            chat_id = %chat_id,
            mode = ?mode,
            thumbnail = thumbnail.unwrap_or("none"),
            caption,
            path = %dest.display(),
            "result delivered"
        );
        Ok(dest.display().to_string())
    }

    async fn post_status(&self, chat_id: ChatId, text: &str) -> mf_core::Result<StatusRef> {
        let message_id = self.next_message.fetch_add(1, Ordering::Relaxed);
        tracing::info!(chat_id = %chat_id, message_id, "{text}");
        Ok(StatusRef {
            chat_id,
            message_id,
        })
    }

    async fn update_status(&self, status: &StatusRef, text: &str) -> mf_core::Result<()> {
        tracing::info!(chat_id = %status.chat_id, message_id = status.message_id, "{text}");
        Ok(())
    }
}
