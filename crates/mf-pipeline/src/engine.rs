//! ffmpeg-backed [`TransformEngine`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mf_av::actions::{self, FfmpegInvocation};
use mf_av::probe::{probe, render_report};
use mf_av::ToolRegistry;
use mf_core::{Error, FileKind, JobSpec, MergeVariant};

use crate::context::{ProgressSender, ProgressTick};
use crate::endpoint::{AcquiredInput, TransformEngine, TransformOutput, TransformRequest};

/// Runs every job kind through ffmpeg, or ffprobe for media info.
pub struct FfmpegEngine {
    tools: Arc<ToolRegistry>,
    /// Passed to ffmpeg as `-threads`.
    threads: u32,
}

impl FfmpegEngine {
    pub fn new(tools: Arc<ToolRegistry>, threads: u32) -> Self {
        Self { tools, threads }
    }

    /// Probed duration in seconds. Missing ffprobe or an unreadable file
    /// only costs the progress percentage.
    async fn duration_of(&self, path: &Path) -> Option<f64> {
        match probe(&self.tools, path).await {
            Ok(p) => p.duration,
            Err(e) => {
                tracing::debug!(path = %path.display(), "no duration for progress: {e}");
                None
            }
        }
    }

    /// Build the ffmpeg invocation for `request`.
    ///
    /// Writes the concat list for video+video merges into the scratch
    /// directory; everything else is pure argument building.
    pub async fn plan(&self, request: &TransformRequest) -> mf_core::Result<FfmpegInvocation> {
        let output = request.output.as_path();
        let container = request.container;

        let inv = match &request.spec {
            JobSpec::Merge {
                variant: MergeVariant::VideoVideo,
            } => {
                let videos: Vec<&AcquiredInput> = request
                    .inputs
                    .iter()
                    .filter(|i| i.kind == FileKind::Video)
                    .collect();
                if videos.len() < 2 {
                    return Err(Error::transform(format!(
                        "merge needs at least 2 videos, got {}",
                        videos.len()
                    )));
                }

                let mut total = Some(0.0);
                for v in &videos {
                    total = match (total, self.duration_of(&v.path).await) {
                        (Some(t), Some(d)) => Some(t + d),
                        _ => None,
                    };
                }

                let paths: Vec<&Path> = videos.iter().map(|v| v.path.as_path()).collect();
                let list = request.scratch_dir.join("concat.txt");
                actions::write_concat_list(&list, &paths)?;
                actions::merge_videos(&list, output, total)
            }
            JobSpec::Merge {
                variant: MergeVariant::VideoAudio,
            } => {
                let video = required(request, FileKind::Video)?;
                let audio = required(request, FileKind::Audio)?;
                let duration = self.duration_of(video).await;
                actions::merge_audio(video, audio, output, duration)
            }
            JobSpec::Merge {
                variant: MergeVariant::VideoSubtitle,
            } => {
                let video = required(request, FileKind::Video)?;
                let subtitle = required(request, FileKind::Subtitle)?;
                let duration = self.duration_of(video).await;
                actions::merge_subtitle(video, subtitle, output, container, duration)
            }
            JobSpec::Encode { preset } => {
                let video = required(request, FileKind::Video)?;
                let duration = self.duration_of(video).await;
                actions::encode(video, output, preset, container, duration)
            }
            JobSpec::Convert { .. } => {
                let video = required(request, FileKind::Video)?;
                let duration = self.duration_of(video).await;
                actions::remux(video, output, container, duration)
            }
            JobSpec::Watermark { position } => {
                let video = required(request, FileKind::Video)?;
                let image = required(request, FileKind::Image)?;
                let duration = self.duration_of(video).await;
                actions::watermark(video, image, output, *position, duration)
            }
            JobSpec::Trim {
                start_secs,
                end_secs,
            } => {
                let video = required(request, FileKind::Video)?;
                if let Some(total) = self.duration_of(video).await {
                    if *start_secs as f64 >= total {
                        return Err(Error::transform(format!(
                            "trim starts at {start_secs}s but the input is only {total:.2}s long"
                        )));
                    }
                }
                actions::trim(video, output, *start_secs, *end_secs)
            }
            JobSpec::Sample { duration_secs } => {
                let video = required(request, FileKind::Video)?;
                let total = self.duration_of(video).await;
                actions::sample(video, output, total, *duration_secs)
            }
            JobSpec::MediaInfo => {
                return Err(Error::Internal(
                    "media info does not run through ffmpeg".into(),
                ))
            }
        };
        Ok(inv)
    }

    async fn media_info(
        &self,
        request: &TransformRequest,
        progress: &ProgressSender,
    ) -> mf_core::Result<TransformOutput> {
        let input = request
            .inputs
            .first()
            .ok_or_else(|| Error::transform("media info needs an input"))?;
        let probed = probe(&self.tools, &input.path).await?;
        let report = render_report(&input.name, &probed);
        tokio::fs::write(&request.output, &report).await?;
        progress.send(ProgressTick::seconds(1.0, Some(1.0)));
        Ok(TransformOutput {
            path: request.output.clone(),
            report: Some(report),
        })
    }
}

fn required(request: &TransformRequest, kind: FileKind) -> mf_core::Result<&Path> {
    request
        .input_of(kind)
        .map(|i| i.path.as_path())
        .ok_or_else(|| Error::transform(format!("no {kind} input")))
}

#[async_trait]
impl TransformEngine for FfmpegEngine {
    async fn run(
        &self,
        request: TransformRequest,
        progress: &ProgressSender,
    ) -> mf_core::Result<TransformOutput> {
        if matches!(request.spec, JobSpec::MediaInfo) {
            return self.media_info(&request, progress).await;
        }

        let inv = self.plan(&request).await?;
        let expected = inv.expected_secs;
        tracing::info!(job_kind = %request.spec.kind(), output = %inv.output.display(), "running transform");

        actions::run_ffmpeg(&self.tools, &inv, self.threads, |p| {
            progress.send(ProgressTick::seconds(p.out_secs, expected));
        })
        .await?;

        Ok(TransformOutput {
            path: inv.output,
            report: None,
        })
    }
}
