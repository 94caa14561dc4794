//! Re-encode a video to a named preset.

use std::path::Path;

use mf_core::{Container, EncodePreset};

use super::{path_arg, FfmpegInvocation};

/// Scale to the preset resolution and re-encode video and audio.
///
/// MP4 outputs get `+faststart` so they stream before fully downloaded.
pub fn encode(
    input: &Path,
    output: &Path,
    preset: &EncodePreset,
    container: Container,
    duration: Option<f64>,
) -> FfmpegInvocation {
    let mut args = vec![
        "-i".to_string(),
        path_arg(input),
        "-vf".to_string(),
        format!("scale={}:{}", preset.width, preset.height),
        "-c:v".to_string(),
        preset.codec.clone(),
        "-preset".to_string(),
        preset.speed.clone(),
        "-crf".to_string(),
        preset.crf.to_string(),
        "-b:v".to_string(),
        preset.video_bitrate.clone(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        preset.audio_bitrate.clone(),
    ];
    if container == Container::Mp4 {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }

    FfmpegInvocation {
        args,
        output: output.to_path_buf(),
        expected_secs: duration,
    }
}
