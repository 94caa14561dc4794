//! Execute an [`FfmpegInvocation`] with progress streaming.

use crate::actions::FfmpegInvocation;
use crate::command::ToolCommand;
use crate::progress::{EngineProgress, FfmpegProgressParser};
use crate::tools::ToolRegistry;

/// Run ffmpeg for `inv`, handing each progress block to `on_progress`.
///
/// Every run gets `-y -hide_banner -nostats -progress pipe:2` up front and
/// `-threads <threads>` right before the output. No timeout is applied:
/// transforms may legitimately run for hours.
pub async fn run_ffmpeg(
    tools: &ToolRegistry,
    inv: &FfmpegInvocation,
    threads: u32,
    mut on_progress: impl FnMut(EngineProgress),
) -> mf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(["-y", "-hide_banner", "-nostats", "-progress", "pipe:2"]);
    cmd.args(inv.args.iter().cloned());
    if threads > 0 {
        cmd.args(["-threads".to_string(), threads.to_string()]);
    }
    cmd.arg(inv.output.to_string_lossy().as_ref());

    tracing::debug!(args = ?cmd.get_args(), "running ffmpeg");

    let mut parser = FfmpegProgressParser::new();
    cmd.execute_with_stderr_callback(|line| {
        if let Some(progress) = parser.feed(line) {
            on_progress(progress);
        }
    })
    .await?;

    Ok(())
}
