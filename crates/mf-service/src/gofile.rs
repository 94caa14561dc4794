//! Object-storage delivery through the gofile.io API.
//!
//! Two calls: `GET {base}/getServer` picks an upload server, then the file is
//! streamed as multipart field `file` to that server's `/uploadFile`. The
//! response carries the public download page.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use mf_core::config::UploadConfig;
use mf_core::Error;
use mf_pipeline::{ObjectStorage, ProgressSender, ProgressTick};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

const PUBLIC_API: &str = "https://api.gofile.io";
const TARGET: &str = "object storage";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ServerData {
    server: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadData {
    download_page: String,
}

pub struct GofileClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GofileClient {
    pub fn new(config: &UploadConfig) -> Self {
        // No overall timeout: uploads may take long. The deliver stage
        // applies its own.
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build upload HTTP client: {e}");
                Client::new()
            });
        Self {
            client,
            base_url: config.object_storage_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        }
    }

    /// Ask the service for an upload server.
    async fn server(&self) -> mf_core::Result<String> {
        let url = format!("{}/getServer", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::deliver(TARGET, format!("getServer request failed: {e}")))?;
        let envelope: Envelope<ServerData> = read_json(resp, "getServer").await?;
        envelope
            .data
            .map(|d| d.server)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::deliver(TARGET, "getServer returned no server"))
    }

    /// Where uploads go. Only the public API hands out per-server hosts.
    fn upload_url(&self, server: &str) -> String {
        if self.base_url == PUBLIC_API {
            format!("https://{server}.gofile.io/uploadFile")
        } else {
            format!("{}/uploadFile", self.base_url)
        }
    }
}

#[async_trait]
impl ObjectStorage for GofileClient {
    async fn upload_file(&self, path: &Path, progress: &ProgressSender) -> mf_core::Result<String> {
        let server = self.server().await?;
        let url = self.upload_url(&server);

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::deliver(TARGET, format!("cannot open {}: {e}", path.display())))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| Error::deliver(TARGET, format!("cannot stat {}: {e}", path.display())))?
            .len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        // Progress is reported from inside the body stream, which outlives
        // this borrow of `progress`; relay it through a shared counter.
        let sent = Arc::new(AtomicU64::new(0));
        let counter = sent.clone();
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(ref bytes) = chunk {
                counter.fetch_add(bytes.len() as u64, Ordering::Relaxed);
            }
            chunk
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), total).file_name(name);
        let mut form = Form::new().part("file", part);
        if let Some(ref token) = self.token {
            form = form.text("token", token.clone());
        }

        tracing::info!(server = %server, bytes = total, "uploading to object storage");
        let request = self.client.post(&url).multipart(form).send();
        tokio::pin!(request);

        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        let resp = loop {
            tokio::select! {
                resp = &mut request => break resp,
                _ = ticker.tick() => {
                    progress.send(ProgressTick::bytes(sent.load(Ordering::Relaxed), Some(total)));
                }
            }
        }
        .map_err(|e| Error::deliver(TARGET, format!("upload failed: {e}")))?;
        progress.send(ProgressTick::bytes(total, Some(total)));

        let envelope: Envelope<UploadData> = read_json(resp, "uploadFile").await?;
        envelope
            .data
            .map(|d| d.download_page)
            .ok_or_else(|| Error::deliver(TARGET, "upload response had no download page"))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    call: &str,
) -> mf_core::Result<Envelope<T>> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::deliver(TARGET, format!("{call} returned {status}: {body}")));
    }
    let envelope: Envelope<T> = resp
        .json()
        .await
        .map_err(|e| Error::deliver(TARGET, format!("{call} response unreadable: {e}")))?;
    if envelope.status != "ok" {
        return Err(Error::deliver(
            TARGET,
            format!("{call} reported status {}", envelope.status),
        ));
    }
    Ok(envelope)
}
