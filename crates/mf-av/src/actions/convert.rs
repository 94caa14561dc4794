//! Container remux without re-encoding.

use std::path::Path;

use mf_core::Container;

use super::{path_arg, FfmpegInvocation};

/// Copy every stream of `input` into the container of `output`.
pub fn remux(
    input: &Path,
    output: &Path,
    container: Container,
    duration: Option<f64>,
) -> FfmpegInvocation {
    let mut args = vec![
        "-i".to_string(),
        path_arg(input),
        "-map".to_string(),
        "0".to_string(),
        "-c".to_string(),
        "copy".to_string(),
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
