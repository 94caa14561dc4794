//! Media-domain enums and the file classifier.
//!
//! [`classify`] decides a [`FileKind`] purely from the file name's extension
//! against static allow-lists. It never touches the filesystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "m4v", "3gp", "mpg", "mpeg",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "aac", "flac", "wav", "ogg", "m4a", "opus", "wma"];
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt", "sub"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif"];

/// Semantic kind of a submitted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Audio,
    Subtitle,
    Image,
    Unknown,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Subtitle => "subtitle",
            FileKind::Image => "image",
            FileKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(FileKind::Video),
            "audio" => Ok(FileKind::Audio),
            "subtitle" => Ok(FileKind::Subtitle),
            "image" => Ok(FileKind::Image),
            "unknown" => Ok(FileKind::Unknown),
            other => Err(format!("unknown file kind: {other}")),
        }
    }
}

/// Return the lowercased final extension of `name`, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Classify a file by its name.
///
/// Total over every input: names without a recognised extension map to
/// [`FileKind::Unknown`] and the caller decides whether that is fatal.
pub fn classify(name: &str) -> FileKind {
    let Some(ext) = extension_of(name) else {
        return FileKind::Unknown;
    };
    let ext = ext.as_str();

    if VIDEO_EXTENSIONS.contains(&ext) {
        FileKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        FileKind::Audio
    } else if SUBTITLE_EXTENSIONS.contains(&ext) {
        FileKind::Subtitle
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        FileKind::Image
    } else {
        FileKind::Unknown
    }
}

/// Output container format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Mkv,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "mkv",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(Container::Mp4),
            "mkv" => Ok(Container::Mkv),
            other => Err(format!("unknown container: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_allow_list() {
        assert_eq!(classify("clip.mp4"), FileKind::Video);
        assert_eq!(classify("movie.final.mkv"), FileKind::Video);
        assert_eq!(classify("phone.3gp"), FileKind::Video);
        assert_eq!(classify("song.flac"), FileKind::Audio);
        assert_eq!(classify("voice.opus"), FileKind::Audio);
        assert_eq!(classify("episode.en.srt"), FileKind::Subtitle);
        assert_eq!(classify("styled.ass"), FileKind::Subtitle);
        assert_eq!(classify("logo.png"), FileKind::Image);
        assert_eq!(classify("photo.jpeg"), FileKind::Image);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify("CLIP.MP4"), FileKind::Video);
        assert_eq!(classify("Logo.PnG"), FileKind::Image);
    }

    #[test]
    fn unrecognised_names_are_unknown() {
        assert_eq!(classify("report.pdf"), FileKind::Unknown);
        assert_eq!(classify("archive.tar.gz"), FileKind::Unknown);
        assert_eq!(classify("README"), FileKind::Unknown);
        assert_eq!(classify("trailing."), FileKind::Unknown);
        assert_eq!(classify(""), FileKind::Unknown);
    }

    #[test]
    fn only_the_final_extension_counts() {
        assert_eq!(classify("video.mp4.txt"), FileKind::Unknown);
        assert_eq!(classify("subs.srt.mkv"), FileKind::Video);
    }

    #[test]
    fn dotfile_with_known_extension() {
        assert_eq!(classify(".mp4"), FileKind::Video);
    }

    #[test]
    fn container_parse_and_extension() {
        assert_eq!("MKV".parse::<Container>().unwrap(), Container::Mkv);
        assert_eq!(Container::default().extension(), "mp4");
        assert!("avi".parse::<Container>().is_err());
    }

    #[test]
    fn file_kind_round_trips_through_str() {
        for kind in [
            FileKind::Video,
            FileKind::Audio,
            FileKind::Subtitle,
            FileKind::Image,
            FileKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<FileKind>().unwrap(), kind);
        }
    }
}
