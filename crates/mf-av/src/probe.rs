//! ffprobe-backed media probing.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON output into [`MediaProbe`]. The same data renders the
//! plain-text report delivered by the media-info job.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

const PROBE_TIMEOUT: Duration = Duration::from_secs(120);

/// Container-level facts plus every stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    pub format_name: Option<String>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    /// Size in bytes.
    pub size: Option<u64>,
    /// Overall bitrate in bits per second.
    pub bit_rate: Option<u64>,
    pub streams: Vec<StreamInfo>,
}

/// One elementary stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: u32,
    /// `video`, `audio`, `subtitle`, ...
    pub codec_type: String,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub bit_rate: Option<u64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub language: Option<String>,
}

impl MediaProbe {
    pub fn first_stream(&self, codec_type: &str) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.codec_type == codec_type)
    }
}

/// Probe `path` with the registry's ffprobe.
pub async fn probe(tools: &ToolRegistry, path: &Path) -> mf_core::Result<MediaProbe> {
    let ffprobe = tools.require("ffprobe")?;

    let mut cmd = ToolCommand::new(ffprobe.path.clone());
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]);
    cmd.arg(path.to_string_lossy().as_ref());
    cmd.timeout(PROBE_TIMEOUT);

    let output = cmd.execute().await?;
    parse_probe_json(&output.stdout)
}

/// Parse ffprobe's JSON output.
pub fn parse_probe_json(json: &str) -> mf_core::Result<MediaProbe> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| mf_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let streams = ff
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            index: s.index,
            codec_type: s.codec_type.unwrap_or_else(|| "unknown".into()),
            codec_name: s.codec_name,
            width: s.width,
            height: s.height,
            frame_rate: s.r_frame_rate.as_deref().and_then(parse_frame_rate),
            bit_rate: parse_num(s.bit_rate.as_deref()),
            sample_rate: parse_num(s.sample_rate.as_deref()),
            channels: s.channels,
            language: s.tags.language,
        })
        .collect();

    Ok(MediaProbe {
        format_name: ff.format.format_name,
        duration: parse_num(ff.format.duration.as_deref()),
        size: parse_num(ff.format.size.as_deref()),
        bit_rate: parse_num(ff.format.bit_rate.as_deref()),
        streams,
    })
}

fn parse_num<T: std::str::FromStr>(s: Option<&str>) -> Option<T> {
    s.and_then(|v| v.trim().parse().ok())
}

/// Parse an ffprobe rational like `30000/1001`.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den > 0.0).then(|| num / den)
}

/// Render the human-readable media report.
pub fn render_report(file_name: &str, probe: &MediaProbe) -> String {
    let mut out = String::new();
    let na = || "N/A".to_string();

    let _ = writeln!(out, "Media Information");
    let _ = writeln!(out);
    let _ = writeln!(out, "File: {file_name}");
    let _ = writeln!(
        out,
        "Size: {}",
        probe
            .size
            .map(|b| format!("{:.2} MB", b as f64 / (1024.0 * 1024.0)))
            .unwrap_or_else(na)
    );
    let _ = writeln!(
        out,
        "Duration: {}",
        probe
            .duration
            .map(|d| format!("{d:.2} seconds"))
            .unwrap_or_else(na)
    );
    let _ = writeln!(
        out,
        "Format: {}",
        probe.format_name.clone().unwrap_or_else(na)
    );

    for stream in &probe.streams {
        let _ = writeln!(out);
        let _ = writeln!(out, "Stream #{} ({})", stream.index, stream.codec_type);
        let _ = writeln!(
            out,
            "  Codec: {}",
            stream.codec_name.clone().unwrap_or_else(na)
        );
        match stream.codec_type.as_str() {
            "video" => {
                if let (Some(w), Some(h)) = (stream.width, stream.height) {
                    let _ = writeln!(out, "  Resolution: {w}x{h}");
                }
                if let Some(fps) = stream.frame_rate {
                    let _ = writeln!(out, "  FPS: {fps:.2}");
                }
            }
            "audio" => {
                if let Some(rate) = stream.sample_rate {
                    let _ = writeln!(out, "  Sample Rate: {rate} Hz");
                }
                if let Some(ch) = stream.channels {
                    let _ = writeln!(out, "  Channels: {ch}");
                }
            }
            _ => {}
        }
        if let Some(br) = stream.bit_rate {
            let _ = writeln!(out, "  Bitrate: {:.0} kbps", br as f64 / 1000.0);
        }
        if let Some(ref lang) = stream.language {
            let _ = writeln!(out, "  Language: {lang}");
        }
    }

    out
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    bit_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
}
