//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Audio presence and duration of one media file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds; `None` when nothing in the file states a positive one
    pub duration: Option<f64>,
    pub has_audio: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
    avg_frame_rate: Option<String>,
}

impl FfprobeStream {
    fn is(&self, kind: &str) -> bool {
        self.codec_type.as_deref() == Some(kind)
    }

    /// `nb_frames / avg_frame_rate`, for streams that only count frames.
    fn frame_duration(&self) -> Option<f64> {
        let frames = self.nb_frames.as_deref()?.parse::<u64>().ok()?;
        let (num, den) = self.avg_frame_rate.as_deref()?.split_once('/')?;
        let fps = num.parse::<f64>().ok()? / den.parse::<f64>().ok()?;
        positive(frames as f64 / fps)
    }
}

/// Probe a media file with `ffprobe` at `binary`.
pub async fn probe_media(binary: &Path, path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let output = Command::new(binary)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Interpret `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(json: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    // Container first, then per-stream durations, then the video frame count.
    // Browser WebM captures often carry none of the first two.
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds)
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref().and_then(parse_seconds))
                .reduce(f64::max)
        })
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter(|s| s.is("video"))
                .find_map(FfprobeStream::frame_duration)
        });

    Ok(MediaInfo {
        duration,
        has_audio: probe.streams.iter().any(|s| s.is("audio")),
    })
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().and_then(positive)
}

fn positive(d: f64) -> Option<f64> {
    (d.is_finite() && d > 0.0).then_some(d)
}
