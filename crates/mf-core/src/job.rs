//! Job-kind registry and job configuration.
//!
//! Every tool a user can pick is a [`JobKind`]. Each kind has a static
//! [`JobDescriptor`] naming the inputs it needs, whether it must be configured
//! before inputs are accepted, and what it produces. Per-kind settings live in
//! the [`JobConfig`] tagged union and are validated when they are set;
//! [`JobSpec::resolve`] turns a selection plus its configuration into the
//! fully-defaulted parameters the transform engine consumes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::PreconditionError;
use crate::media::FileKind;

/// Sample window lengths a user may choose, in seconds.
pub const SAMPLE_DURATIONS: &[u32] = &[30, 60, 120, 300];

/// Sample window used when no duration was configured.
pub const DEFAULT_SAMPLE_SECS: u32 = 30;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// Which pair of inputs a merge combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeVariant {
    VideoVideo,
    VideoAudio,
    VideoSubtitle,
}

/// The category of transformation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Merge(MergeVariant),
    Encode,
    Convert,
    Watermark,
    Trim,
    Sample,
    MediaInfo,
}

impl JobKind {
    /// Every selectable job kind, in menu order.
    pub const ALL: [JobKind; 9] = [
        JobKind::Merge(MergeVariant::VideoVideo),
        JobKind::Merge(MergeVariant::VideoAudio),
        JobKind::Merge(MergeVariant::VideoSubtitle),
        JobKind::Encode,
        JobKind::Convert,
        JobKind::Watermark,
        JobKind::Trim,
        JobKind::Sample,
        JobKind::MediaInfo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Merge(MergeVariant::VideoVideo) => "merge_video_video",
            JobKind::Merge(MergeVariant::VideoAudio) => "merge_video_audio",
            JobKind::Merge(MergeVariant::VideoSubtitle) => "merge_video_subtitle",
            JobKind::Encode => "encode",
            JobKind::Convert => "convert",
            JobKind::Watermark => "watermark",
            JobKind::Trim => "trim",
            JobKind::Sample => "sample",
            JobKind::MediaInfo => "mediainfo",
        }
    }

    /// Static descriptor for this kind.
    pub fn descriptor(self) -> &'static JobDescriptor {
        match self {
            JobKind::Merge(MergeVariant::VideoVideo) => &MERGE_VIDEO_VIDEO,
            JobKind::Merge(MergeVariant::VideoAudio) => &MERGE_VIDEO_AUDIO,
            JobKind::Merge(MergeVariant::VideoSubtitle) => &MERGE_VIDEO_SUBTITLE,
            JobKind::Encode => &ENCODE,
            JobKind::Convert => &CONVERT,
            JobKind::Watermark => &WATERMARK,
            JobKind::Trim => &TRIM,
            JobKind::Sample => &SAMPLE,
            JobKind::MediaInfo => &MEDIAINFO,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown job kind: {s}"))
    }
}

impl Serialize for JobKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// A named input slot filled by one file of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRole {
    pub name: &'static str,
    pub kind: FileKind,
}

/// How a job kind decides that enough input has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPolicy {
    /// Ready once `count` files of `kind` are staged.
    Count { kind: FileKind, count: usize },
    /// Ready once every role has one matching file, in any arrival order.
    Roles(&'static [InputRole]),
    /// Ready on the first file of any accepted kind.
    Single(&'static [FileKind]),
}

impl InputPolicy {
    /// File kinds this policy can make use of.
    pub fn accepted_kinds(&self) -> Vec<FileKind> {
        match self {
            InputPolicy::Count { kind, .. } => vec![*kind],
            InputPolicy::Roles(roles) => {
                let mut kinds: Vec<FileKind> = Vec::with_capacity(roles.len());
                for role in roles.iter() {
                    if !kinds.contains(&role.kind) {
                        kinds.push(role.kind);
                    }
                }
                kinds
            }
            InputPolicy::Single(kinds) => kinds.to_vec(),
        }
    }

    pub fn accepts(&self, kind: FileKind) -> bool {
        self.accepted_kinds().contains(&kind)
    }

    /// Total number of inputs a ready job consumes.
    pub fn input_count(&self) -> usize {
        match self {
            InputPolicy::Count { count, .. } => *count,
            InputPolicy::Roles(roles) => roles.len(),
            InputPolicy::Single(_) => 1,
        }
    }
}

/// What a finished transform hands to the deliver stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// A media file in the user's preferred container.
    Media,
    /// A plain-text report.
    Report,
}

/// Static description of a job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDescriptor {
    pub kind: JobKind,
    pub label: &'static str,
    pub inputs: InputPolicy,
    /// Whether a [`JobConfig`] must be set before inputs are accepted.
    pub config_required: bool,
    pub output: OutputShape,
}

const VIDEO_ONLY: &[FileKind] = &[FileKind::Video];
const VIDEO_OR_AUDIO: &[FileKind] = &[FileKind::Video, FileKind::Audio];

const VIDEO_AUDIO_ROLES: &[InputRole] = &[
    InputRole { name: "video", kind: FileKind::Video },
    InputRole { name: "audio", kind: FileKind::Audio },
];
const VIDEO_SUBTITLE_ROLES: &[InputRole] = &[
    InputRole { name: "video", kind: FileKind::Video },
    InputRole { name: "subtitle", kind: FileKind::Subtitle },
];
const WATERMARK_ROLES: &[InputRole] = &[
    InputRole { name: "video", kind: FileKind::Video },
    InputRole { name: "watermark image", kind: FileKind::Image },
];

static MERGE_VIDEO_VIDEO: JobDescriptor = JobDescriptor {
    kind: JobKind::Merge(MergeVariant::VideoVideo),
    label: "Merge videos",
    inputs: InputPolicy::Count { kind: FileKind::Video, count: 2 },
    config_required: false,
    output: OutputShape::Media,
};

static MERGE_VIDEO_AUDIO: JobDescriptor = JobDescriptor {
    kind: JobKind::Merge(MergeVariant::VideoAudio),
    label: "Merge video + audio",
    inputs: InputPolicy::Roles(VIDEO_AUDIO_ROLES),
    config_required: false,
    output: OutputShape::Media,
};

static MERGE_VIDEO_SUBTITLE: JobDescriptor = JobDescriptor {
    kind: JobKind::Merge(MergeVariant::VideoSubtitle),
    label: "Merge video + subtitle",
    inputs: InputPolicy::Roles(VIDEO_SUBTITLE_ROLES),
    config_required: false,
    output: OutputShape::Media,
};

static ENCODE: JobDescriptor = JobDescriptor {
    kind: JobKind::Encode,
    label: "Encode",
    inputs: InputPolicy::Single(VIDEO_ONLY),
    config_required: true,
    output: OutputShape::Media,
};

static CONVERT: JobDescriptor = JobDescriptor {
    kind: JobKind::Convert,
    label: "Convert",
    inputs: InputPolicy::Single(VIDEO_ONLY),
    config_required: false,
    output: OutputShape::Media,
};

static WATERMARK: JobDescriptor = JobDescriptor {
    kind: JobKind::Watermark,
    label: "Watermark",
    inputs: InputPolicy::Roles(WATERMARK_ROLES),
    config_required: false,
    output: OutputShape::Media,
};

static TRIM: JobDescriptor = JobDescriptor {
    kind: JobKind::Trim,
    label: "Trim",
    inputs: InputPolicy::Single(VIDEO_ONLY),
    config_required: true,
    output: OutputShape::Media,
};

static SAMPLE: JobDescriptor = JobDescriptor {
    kind: JobKind::Sample,
    label: "Sample",
    inputs: InputPolicy::Single(VIDEO_ONLY),
    config_required: false,
    output: OutputShape::Media,
};

static MEDIAINFO: JobDescriptor = JobDescriptor {
    kind: JobKind::MediaInfo,
    label: "Media info",
    inputs: InputPolicy::Single(VIDEO_OR_AUDIO),
    config_required: false,
    output: OutputShape::Report,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A named encoding preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodePreset {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub crf: u8,
    /// Target video bitrate in ffmpeg notation (e.g. `3000k`).
    pub video_bitrate: String,
    pub audio_bitrate: String,
    /// Encoder speed preset (e.g. `medium`).
    pub speed: String,
    /// Encoder name passed to `-c:v`.
    pub codec: String,
}

impl EncodePreset {
    fn check(&self) -> Result<(), PreconditionError> {
        if self.width == 0 || self.height == 0 {
            return Err(PreconditionError::InvalidConfig(format!(
                "preset {} has an empty resolution",
                self.name
            )));
        }
        if self.codec.trim().is_empty() {
            return Err(PreconditionError::InvalidConfig(format!(
                "preset {} has no codec",
                self.name
            )));
        }
        Ok(())
    }
}

/// How a converted video is handed back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertMode {
    #[default]
    ToDocument,
    ToStream,
}

/// Where a watermark image is overlaid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl OverlayPosition {
    /// The `x:y` argument for ffmpeg's `overlay` filter, with a 10px margin.
    pub fn overlay_expr(self) -> &'static str {
        match self {
            OverlayPosition::TopLeft => "10:10",
            OverlayPosition::TopRight => "W-w-10:10",
            OverlayPosition::BottomLeft => "10:H-h-10",
            OverlayPosition::BottomRight => "W-w-10:H-h-10",
            OverlayPosition::Center => "(W-w)/2:(H-h)/2",
        }
    }
}

impl FromStr for OverlayPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace(|c: char| c == '-' || c == '_', "").to_ascii_lowercase().as_str() {
            "topleft" => Ok(OverlayPosition::TopLeft),
            "topright" => Ok(OverlayPosition::TopRight),
            "bottomleft" => Ok(OverlayPosition::BottomLeft),
            "bottomright" => Ok(OverlayPosition::BottomRight),
            "center" => Ok(OverlayPosition::Center),
            other => Err(format!("unknown overlay position: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeConfig {
    pub preset: EncodePreset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertConfig {
    pub mode: ConvertMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    pub position: OverlayPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimConfig {
    pub start_secs: u64,
    pub end_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleConfig {
    pub duration_secs: u32,
}

/// Job-kind-specific configuration, one variant per configurable kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobConfig {
    Encode(EncodeConfig),
    Convert(ConvertConfig),
    Watermark(WatermarkConfig),
    Trim(TrimConfig),
    Sample(SampleConfig),
}

impl JobConfig {
    /// Parse a `start:end` trim range given in whole seconds.
    pub fn trim_from_range(range: &str) -> Result<Self, PreconditionError> {
        let invalid = || {
            PreconditionError::InvalidConfig(format!(
                "trim range must look like start:end in seconds, got {range:?}"
            ))
        };
        let (start, end) = range.split_once(':').ok_or_else(invalid)?;
        let start_secs = start.trim().parse::<u64>().map_err(|_| invalid())?;
        let end_secs = end.trim().parse::<u64>().map_err(|_| invalid())?;
        let config = JobConfig::Trim(TrimConfig { start_secs, end_secs });
        config.validate()?;
        Ok(config)
    }

    /// Whether this configuration belongs to `kind`.
    pub fn matches(&self, kind: JobKind) -> bool {
        matches!(
            (self, kind),
            (JobConfig::Encode(_), JobKind::Encode)
                | (JobConfig::Convert(_), JobKind::Convert)
                | (JobConfig::Watermark(_), JobKind::Watermark)
                | (JobConfig::Trim(_), JobKind::Trim)
                | (JobConfig::Sample(_), JobKind::Sample)
        )
    }

    /// Check the configuration's own invariants.
    pub fn validate(&self) -> Result<(), PreconditionError> {
        match self {
            JobConfig::Encode(c) => c.preset.check(),
            JobConfig::Trim(c) if c.end_secs <= c.start_secs => {
                Err(PreconditionError::InvalidConfig(format!(
                    "trim end ({}) must be greater than start ({})",
                    c.end_secs, c.start_secs
                )))
            }
            JobConfig::Sample(c) if !SAMPLE_DURATIONS.contains(&c.duration_secs) => {
                Err(PreconditionError::InvalidConfig(format!(
                    "sample duration must be one of {SAMPLE_DURATIONS:?} seconds, got {}",
                    c.duration_secs
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// JobSpec
// ---------------------------------------------------------------------------

/// Fully resolved transform parameters for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSpec {
    Merge { variant: MergeVariant },
    Encode { preset: EncodePreset },
    Convert { mode: ConvertMode },
    Watermark { position: OverlayPosition },
    Trim { start_secs: u64, end_secs: u64 },
    Sample { duration_secs: u32 },
    MediaInfo,
}

impl JobSpec {
    /// Combine a job-kind selection with its stored configuration.
    ///
    /// Kinds whose descriptor requires configuration fail with
    /// [`PreconditionError::ConfigureFirst`] when none is stored; the others
    /// fall back to their defaults.
    pub fn resolve(kind: JobKind, config: Option<&JobConfig>) -> Result<Self, PreconditionError> {
        if let Some(cfg) = config {
            if !cfg.matches(kind) {
                return Err(PreconditionError::InvalidConfig(format!(
                    "stored configuration does not belong to {kind}"
                )));
            }
        }

        let spec = match (kind, config) {
            (JobKind::Merge(variant), _) => JobSpec::Merge { variant },
            (JobKind::Encode, Some(JobConfig::Encode(c))) => JobSpec::Encode {
                preset: c.preset.clone(),
            },
            (JobKind::Convert, Some(JobConfig::Convert(c))) => JobSpec::Convert { mode: c.mode },
            (JobKind::Convert, _) => JobSpec::Convert { mode: ConvertMode::default() },
            (JobKind::Watermark, Some(JobConfig::Watermark(c))) => JobSpec::Watermark {
                position: c.position,
            },
            (JobKind::Watermark, _) => JobSpec::Watermark {
                position: OverlayPosition::default(),
            },
            (JobKind::Trim, Some(JobConfig::Trim(c))) => JobSpec::Trim {
                start_secs: c.start_secs,
                end_secs: c.end_secs,
            },
            (JobKind::Sample, Some(JobConfig::Sample(c))) => JobSpec::Sample {
                duration_secs: c.duration_secs,
            },
            (JobKind::Sample, _) => JobSpec::Sample { duration_secs: DEFAULT_SAMPLE_SECS },
            (JobKind::MediaInfo, _) => JobSpec::MediaInfo,
            (JobKind::Encode | JobKind::Trim, _) => {
                return Err(PreconditionError::ConfigureFirst { kind });
            }
        };
        Ok(spec)
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobSpec::Merge { variant } => JobKind::Merge(*variant),
            JobSpec::Encode { .. } => JobKind::Encode,
            JobSpec::Convert { .. } => JobKind::Convert,
            JobSpec::Watermark { .. } => JobKind::Watermark,
            JobSpec::Trim { .. } => JobKind::Trim,
            JobSpec::Sample { .. } => JobKind::Sample,
            JobSpec::MediaInfo => JobKind::MediaInfo,
        }
    }
}
