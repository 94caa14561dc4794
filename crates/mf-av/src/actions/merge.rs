//! The three merge variants.

use std::path::Path;

use mf_core::{Container, Error};

use super::{path_arg, FfmpegInvocation};

/// Render a concat-demuxer list. Single quotes in paths are escaped the way
/// the demuxer expects (`'\''`).
pub fn concat_list(inputs: &[&Path]) -> String {
    inputs
        .iter()
        .map(|p| format!("file '{}'\n", path_arg(p).replace('\'', "'\\''")))
        .collect()
}

/// Write the concat list for `inputs` to `list_path`.
pub fn write_concat_list(list_path: &Path, inputs: &[&Path]) -> mf_core::Result<()> {
    std::fs::write(list_path, concat_list(inputs)).map_err(|e| {
        Error::transform(format!(
            "failed to write concat list {}: {e}",
            list_path.display()
        ))
    })
}

/// Join videos end to end without re-encoding.
///
/// `list_path` must already hold the list written by [`write_concat_list`].
pub fn merge_videos(list_path: &Path, output: &Path, total_secs: Option<f64>) -> FfmpegInvocation {
    FfmpegInvocation {
        args: vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(list_path),
            "-c".into(),
            "copy".into(),
        ],
        output: output.to_path_buf(),
        expected_secs: total_secs,
    }
}

/// Replace the audio of `video` with `audio`.
pub fn merge_audio(
    video: &Path,
    audio: &Path,
    output: &Path,
    duration: Option<f64>,
) -> FfmpegInvocation {
    FfmpegInvocation {
        args: vec![
            "-i".into(),
            path_arg(video),
            "-i".into(),
            path_arg(audio),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
        ],
        output: output.to_path_buf(),
        expected_secs: duration,
    }
}

/// Mux a subtitle track into `video`. MP4 only carries `mov_text`.
pub fn merge_subtitle(
    video: &Path,
    subtitle: &Path,
    output: &Path,
    container: Container,
    duration: Option<f64>,
) -> FfmpegInvocation {
    let subtitle_codec = match container {
        Container::Mp4 => "mov_text",
        Container::Mkv => "srt",
    };
    FfmpegInvocation {
        args: vec![
            "-i".into(),
            path_arg(video),
            "-i".into(),
            path_arg(subtitle),
            "-map".into(),
            "0".into(),
            "-map".into(),
            "1".into(),
            "-c".into(),
            "copy".into(),
            "-c:s".into(),
            subtitle_codec.into(),
        ],
        output: output.to_path_buf(),
        expected_secs: duration,
    }
}
