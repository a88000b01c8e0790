//! Video container analysis via `ffprobe` (spec.md §4.4).

use std::path::Path;
use std::process::{Command, Stdio};

use recon_models::{Colorspace, ReconError, VideoMetadata};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    color_space: Option<String>,
}

/// Probe `path` for duration, resolution, frame rate, and colorspace, and
/// derive the equirectangular flag (spec.md §4.4).
pub fn probe_video(path: impl AsRef<Path>) -> Result<VideoMetadata, ReconError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ReconError::UnreadableVideo(format!("{} does not exist", path.display())));
    }

    let ffprobe = which::which("ffprobe")
        .map_err(|_| ReconError::UnreadableVideo("ffprobe not found on PATH".into()))?;

    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ReconError::io_error(path.display().to_string(), e))?;

    if !output.status.success() {
        return Err(ReconError::UnreadableVideo(format!(
            "ffprobe exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| ReconError::UnreadableVideo(format!("could not parse ffprobe output: {e}")))?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| ReconError::UnreadableVideo("no video stream found".into()))?;

    if let Some(codec) = &video_stream.codec_name {
        if UNSUPPORTED_CODECS.contains(&codec.as_str()) {
            return Err(ReconError::UnsupportedCodec(codec.clone()));
        }
    }

    let duration_secs = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);

    let frame_rate = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    let colorspace = match video_stream.color_space.as_deref() {
        Some("bt470bg") | Some("smpte170m") => Colorspace::Bt601,
        Some("bt709") => Colorspace::Bt709,
        Some("bt2020nc") | Some("bt2020c") => Colorspace::Bt2020,
        _ => Colorspace::Unknown,
    };

    let is_equirectangular = VideoMetadata::detect_equirectangular(width, height);
    debug!(width, height, frame_rate, is_equirectangular, "probed video");

    Ok(VideoMetadata { duration_secs, width, height, frame_rate, colorspace, is_equirectangular })
}

const UNSUPPORTED_CODECS: &[&str] = &["none"];

fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rational_and_decimal_frame_rates() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("30/0"), None);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let result = probe_video("/nonexistent/path/video.mp4");
        assert!(matches!(result, Err(ReconError::UnreadableVideo(_))));
    }
}
