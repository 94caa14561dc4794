//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::ids::{ChatId, UserId};
use crate::job::EncodePreset;
use crate::Error;

/// Largest input accepted by default (2 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

const KNOWN_CODECS: &[&str] = &["libx264", "libx265", "libvpx-vp9", "libaom-av1", "libsvtav1"];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub access: AccessConfig,
    pub tools: ToolsConfig,
    pub pipeline: PipelineConfig,
    pub upload: UploadConfig,
    pub presets: BTreeMap<String, PresetConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            access: AccessConfig::default(),
            tools: ToolsConfig::default(),
            pipeline: PipelineConfig::default(),
            upload: UploadConfig::default(),
            presets: default_presets(),
        }
    }
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Look up an encoding preset by name.
    pub fn preset(&self, name: &str) -> Option<EncodePreset> {
        self.presets.get(name).map(|p| p.to_preset(name))
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.acquire_retries == 0 && self.pipeline.acquire_timeout_secs == 0 {
            warnings.push(
                "pipeline.acquire_retries and acquire_timeout_secs are both 0; \
                 every fetch will fail immediately"
                    .into(),
            );
        }

        if self.tools.threads == 0 {
            warnings.push("tools.threads is 0; ffmpeg will pick its own thread count".into());
        }

        if self.storage.max_file_size == 0 {
            warnings.push("storage.max_file_size is 0; file sizes are not checked".into());
        }

        if self.access.owner_id.is_none() && self.access.authorized_groups.is_empty() {
            warnings.push(
                "access has no owner_id and no authorized_groups; only private chats \
                 with allow_private can submit work"
                    .into(),
            );
        }

        for (name, preset) in &self.presets {
            if !KNOWN_CODECS.contains(&preset.codec.as_str()) {
                warnings.push(format!(
                    "presets.{name}.codec '{}' is not a recognized encoder (valid: {})",
                    preset.codec,
                    KNOWN_CODECS.join(", ")
                ));
            }
            if preset.width == 0
                || preset.height == 0
                || preset.width % 2 != 0
                || preset.height % 2 != 0
            {
                warnings.push(format!(
                    "presets.{name} resolution {}x{} must be non-zero and even",
                    preset.width, preset.height
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Working storage and database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the per-user, per-task working directories.
    pub work_dir: PathBuf,
    pub db_path: PathBuf,
    /// Largest accepted input, in bytes.
    pub max_file_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("downloads"),
            db_path: PathBuf::from("mediaforge.db"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Who may submit work, and where.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub owner_id: Option<UserId>,
    pub sudo_users: Vec<UserId>,
    pub authorized_groups: Vec<ChatId>,
    /// Whether non-admin principals may submit in private chats.
    pub allow_private: bool,
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Passed to ffmpeg as `-threads`.
    pub threads: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            threads: 2,
        }
    }
}

/// Stage timeouts, retries and progress pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub acquire_timeout_secs: u64,
    /// Extra attempts after the first failed fetch of one input.
    pub acquire_retries: u32,
    pub retry_backoff_ms: u64,
    pub deliver_timeout_secs: u64,
    /// Minimum spacing between two status message edits.
    pub progress_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: 3600,
            acquire_retries: 2,
            retry_backoff_ms: 1000,
            deliver_timeout_secs: 3600,
            progress_interval_ms: 2000,
        }
    }
}

impl PipelineConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn deliver_timeout(&self) -> Duration {
        Duration::from_secs(self.deliver_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Remote object-storage target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub object_storage_url: String,
    pub api_token: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            object_storage_url: "https://api.gofile.io".into(),
            api_token: None,
        }
    }
}

/// One encoding preset as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetConfig {
    pub width: u32,
    pub height: u32,
    pub crf: u8,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    #[serde(default = "default_speed")]
    pub speed: String,
    #[serde(default = "default_codec")]
    pub codec: String,
}

fn default_speed() -> String {
    "medium".into()
}

fn default_codec() -> String {
    "libx264".into()
}

impl PresetConfig {
    pub fn to_preset(&self, name: &str) -> EncodePreset {
        EncodePreset {
            name: name.to_string(),
            width: self.width,
            height: self.height,
            crf: self.crf,
            video_bitrate: self.video_bitrate.clone(),
            audio_bitrate: self.audio_bitrate.clone(),
            speed: self.speed.clone(),
            codec: self.codec.clone(),
        }
    }
}

fn preset(width: u32, height: u32, hevc: bool, video: &str, audio: &str) -> PresetConfig {
    PresetConfig {
        width,
        height,
        crf: if hevc { 28 } else { 23 },
        video_bitrate: video.into(),
        audio_bitrate: audio.into(),
        speed: default_speed(),
        codec: if hevc { "libx265" } else { "libx264" }.into(),
    }
}

/// The built-in preset table.
pub fn default_presets() -> BTreeMap<String, PresetConfig> {
    [
        ("1080p", preset(1920, 1080, false, "5000k", "192k")),
        ("1080p_hevc", preset(1920, 1080, true, "3500k", "192k")),
        ("720p", preset(1280, 720, false, "3000k", "128k")),
        ("720p_hevc", preset(1280, 720, true, "2000k", "128k")),
        ("480p", preset(854, 480, false, "1500k", "128k")),
        ("480p_hevc", preset(854, 480, true, "1000k", "128k")),
        ("360p", preset(640, 360, false, "800k", "96k")),
    ]
    .into_iter()
    .map(|(name, p)| (name.to_string(), p))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.storage.work_dir, PathBuf::from("downloads"));
        assert_eq!(cfg.storage.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(cfg.tools.threads, 2);
        assert_eq!(cfg.pipeline.acquire_retries, 2);
        assert_eq!(cfg.pipeline.progress_interval(), Duration::from_secs(2));
        assert_eq!(cfg.upload.object_storage_url, "https://api.gofile.io");
        assert_eq!(cfg.presets.len(), 7);
    }

    #[test]
    fn default_config_only_warns_about_access() {
        let warnings = Config::default().validate();
        assert_eq!(warnings.len(), 1, "unexpected warnings: {warnings:?}");
        assert!(warnings[0].contains("owner_id"));
    }

    #[test]
    fn owner_silences_access_warning() {
        let mut cfg = Config::default();
        cfg.access.owner_id = Some(UserId(1));
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn preset_lookup() {
        let cfg = Config::default();
        let p = cfg.preset("720p_hevc").unwrap();
        assert_eq!(p.name, "720p_hevc");
        assert_eq!((p.width, p.height), (1280, 720));
        assert_eq!(p.crf, 28);
        assert_eq!(p.codec, "libx265");
        assert_eq!(p.speed, "medium");
        assert!(cfg.preset("4k").is_none());
    }

    #[test]
    fn bad_presets_warn() {
        let mut cfg = Config::default();
        cfg.access.owner_id = Some(UserId(1));
        cfg.presets.insert("odd".into(), preset(853, 480, false, "1M", "96k"));
        let mut broken = preset(640, 360, false, "1M", "96k");
        broken.codec = "h264_magic".into();
        cfg.presets.insert("weird".into(), broken);

        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("presets.odd")));
        assert!(warnings.iter().any(|w| w.contains("h264_magic")));
    }

    #[test]
    fn zero_threads_and_no_retries_warn() {
        let mut cfg = Config::default();
        cfg.tools.threads = 0;
        cfg.pipeline.acquire_retries = 0;
        cfg.pipeline.acquire_timeout_secs = 0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("tools.threads")));
        assert!(warnings.iter().any(|w| w.contains("acquire_retries")));
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{
            "access": {"owner_id": 42, "authorized_groups": [-100123]},
            "pipeline": {"acquire_retries": 5},
            "presets": {"tiny": {"width": 320, "height": 240, "crf": 30,
                                 "video_bitrate": "300k", "audio_bitrate": "64k"}}
        }"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.access.owner_id, Some(UserId(42)));
        assert_eq!(cfg.access.authorized_groups, vec![ChatId(-100123)]);
        assert_eq!(cfg.pipeline.acquire_retries, 5);
        assert_eq!(cfg.pipeline.retry_backoff_ms, 1000);
        assert_eq!(cfg.presets.len(), 1);
        assert_eq!(cfg.preset("tiny").unwrap().codec, "libx264");
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.tools.threads, 2);
        assert_eq!(cfg.presets.len(), 7);
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(matches!(Config::from_json("{"), Err(Error::Validation(_))));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/mediaforge.json")));
        assert_eq!(cfg.tools.threads, 2);
        assert_eq!(Config::load_or_default(None).presets.len(), 7);
    }
}
