//! Technical inspection of video files.
//!
//! The default implementation shells out to `ffprobe` and maps its JSON
//! report onto the same language / codec / resolution tags the classifier
//! extracts from filenames.

use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

use crate::model::TechnicalInfo;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// The inspection tool is missing.
    #[error("probe unavailable: {0}")]
    Unavailable(String),

    #[error("probe failed: {0}")]
    Failed(String),
}

pub trait TechnicalProbe {
    fn inspect(&mut self, path: &Path) -> Result<TechnicalInfo, ProbeError>;
}

/// Probe that is never available. Placement falls back to filename tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProbe;

impl TechnicalProbe for NoProbe {
    fn inspect(&mut self, _path: &Path) -> Result<TechnicalInfo, ProbeError> {
        Err(ProbeError::Unavailable("probing disabled".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        FfprobeProbe {
            binary: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeProbe {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        FfprobeProbe {
            binary: binary.into(),
        }
    }
}

impl TechnicalProbe for FfprobeProbe {
    fn inspect(&mut self, path: &Path) -> Result<TechnicalInfo, ProbeError> {
        let output = Command::new(&self.binary)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    ProbeError::Unavailable(format!("{} not found", self.binary.display()))
                }
                _ => ProbeError::Failed(e.to_string()),
            })?;
        if !output.status.success() {
            return Err(ProbeError::Failed(format!(
                "{} exited with {} for {}",
                self.binary.display(),
                output.status,
                path.display()
            )));
        }
        let report: ProbeReport = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::Failed(format!("unreadable probe output: {}", e)))?;
        let info = technical_info(&report.streams);
        debug!("Probed {}: {:?}", path.display(), info);
        Ok(info)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeReport {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub tags: Option<StreamTags>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamTags {
    #[serde(default)]
    pub language: Option<String>,
}

impl ProbeStream {
    fn is_french(&self) -> bool {
        self.tags
            .as_ref()
            .and_then(|t| t.language.as_deref())
            .map(|l| matches!(l.to_lowercase().as_str(), "fre" | "fra" | "fr" | "french"))
            .unwrap_or(false)
    }
}

/// Map probed streams to tags. Several audio tracks mean MULTi unless only
/// the subtitles are French; one audio track is FR, VOSTFR or VO.
pub fn technical_info(streams: &[ProbeStream]) -> TechnicalInfo {
    let audio: Vec<&ProbeStream> = streams.iter().filter(|s| s.codec_type == "audio").collect();
    let subtitles: Vec<&ProbeStream> = streams
        .iter()
        .filter(|s| s.codec_type == "subtitle")
        .collect();
    let video = streams.iter().find(|s| s.codec_type == "video");

    // Untagged audio counts as French.
    let audio_french = audio.is_empty()
        || audio.iter().any(|s| s.is_french())
        || audio.iter().all(|s| s.tags.as_ref().and_then(|t| t.language.as_ref()).is_none());
    let subtitles_french = subtitles.iter().any(|s| s.is_french());

    let audio_language = match audio.len() {
        0 => None,
        1 if audio_french => Some("FR"),
        1 if subtitles_french => Some("VOSTFR"),
        1 => Some("VO"),
        _ if subtitles_french && !audio_french => Some("VOSTFR"),
        _ => Some("MULTi"),
    };

    let codec = video.and_then(|v| match v.codec_name.to_lowercase().as_str() {
        "h264" | "avc" => Some("x264".to_string()),
        "hevc" | "h265" => Some("HEVC".to_string()),
        "av1" => Some("AV1".to_string()),
        "" => None,
        other => Some(other.to_string()),
    });

    let resolution = video.map(|v| {
        let (w, h) = (v.width.unwrap_or(0), v.height.unwrap_or(0));
        if w > 3800 || h > 2100 {
            "2160p"
        } else if w > 1900 || h > 1000 {
            "1080p"
        } else if w > 1200 || h > 700 {
            "720p"
        } else if w > 700 || h > 500 {
            "DVDRip"
        } else {
            "XviD"
        }
        .to_string()
    });

    TechnicalInfo {
        audio_language: audio_language.map(String::from),
        codec,
        resolution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> TechnicalInfo {
        let report: ProbeReport = serde_json::from_str(json).unwrap();
        technical_info(&report.streams)
    }

    #[test]
    fn test_single_french_track() {
        let info = parse(
            r#"{"streams":[
                {"codec_type":"video","codec_name":"h264","width":1920,"height":800},
                {"codec_type":"audio","codec_name":"ac3","tags":{"language":"fre"}}
            ]}"#,
        );
        assert_eq!(info.spec_tag(), "FR x264 1080p");
    }

    #[test]
    fn test_two_tracks_is_multi() {
        let info = parse(
            r#"{"streams":[
                {"codec_type":"video","codec_name":"hevc","width":3840,"height":1600},
                {"codec_type":"audio","tags":{"language":"fre"}},
                {"codec_type":"audio","tags":{"language":"eng"}}
            ]}"#,
        );
        assert_eq!(info.spec_tag(), "MULTi HEVC 2160p");
    }

    #[test]
    fn test_original_audio_with_french_subtitles() {
        let info = parse(
            r#"{"streams":[
                {"codec_type":"video","codec_name":"mpeg4","width":720,"height":400},
                {"codec_type":"audio","tags":{"language":"eng"}},
                {"codec_type":"subtitle","tags":{"language":"fre"}}
            ]}"#,
        );
        assert_eq!(info.audio_language.as_deref(), Some("VOSTFR"));
        assert_eq!(info.resolution.as_deref(), Some("DVDRip"));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let mut probe = FfprobeProbe::with_binary("/nonexistent/ffprobe-cinesort");
        let err = probe.inspect(Path::new("/tmp/a.mkv")).unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable(_)));
    }
}
