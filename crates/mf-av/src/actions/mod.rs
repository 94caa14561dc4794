//! ffmpeg argument builders, one per job kind, and the runner that executes
//! them with progress reporting.
//!
//! Builders are pure: they return an [`FfmpegInvocation`] and never touch
//! the filesystem, except [`write_concat_list`] which the video+video merge
//! needs before ffmpeg starts.

mod clip;
mod convert;
mod encode;
mod merge;
mod run;
mod watermark;

use std::path::PathBuf;

pub use clip::{sample, sample_window, trim};
pub use convert::remux;
pub use encode::encode;
pub use merge::{concat_list, merge_audio, merge_subtitle, merge_videos, write_concat_list};
pub use run::run_ffmpeg;
pub use watermark::watermark;

/// Arguments for one ffmpeg run, minus the flags every run shares.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegInvocation {
    /// Inputs, filters and codec options.
    pub args: Vec<String>,
    pub output: PathBuf,
    /// Expected output duration in seconds, used to turn engine time into a
    /// percentage.
    pub expected_secs: Option<f64>,
}

fn path_arg(p: &std::path::Path) -> String {
    p.to_string_lossy().to_string()
}
