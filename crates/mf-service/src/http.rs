//! Remote fetcher for link inputs.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use mf_core::Error;
use mf_pipeline::{ProgressSender, ProgressTick, RemoteFetcher};
use reqwest::Client;
use tokio::io::AsyncWriteExt;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Streams an HTTP(S) GET straight to disk.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build download HTTP client: {e}");
                Client::new()
            });
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressSender,
    ) -> mf_core::Result<u64> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::acquire(url, format!("request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::acquire(url, format!("server answered {status}")));
        }

        let total = resp.content_length();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::acquire(url, format!("cannot create {}: {e}", dest.display())))?;

        let mut written = 0u64;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::acquire(url, format!("download interrupted: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::acquire(url, format!("write failed: {e}")))?;
            written += chunk.len() as u64;
            progress.send(ProgressTick::bytes(written, total));
        }
        file.flush()
            .await
            .map_err(|e| Error::acquire(url, format!("write failed: {e}")))?;

        tracing::debug!(url, bytes = written, "download finished");
        Ok(written)
    }
}
