//! Overlay an image on a video.

use std::path::Path;

use mf_core::OverlayPosition;

use super::{path_arg, FfmpegInvocation};

pub fn watermark(
    video: &Path,
    image: &Path,
    output: &Path,
    position: OverlayPosition,
    duration: Option<f64>,
) -> FfmpegInvocation {
    FfmpegInvocation {
        args: vec![
            "-i".into(),
            path_arg(video),
            "-i".into(),
            path_arg(image),
            "-filter_complex".into(),
            format!("[0:v][1:v]overlay={}", position.overlay_expr()),
            "-c:a".into(),
            "copy".into(),
        ],
        output: output.to_path_buf(),
        expected_secs: duration,
    }
}
