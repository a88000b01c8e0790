//! Probed video metadata (spec.md §4.4 Video Analyzer output).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Colorspace {
    #[default]
    Unknown,
    Bt601,
    Bt709,
    Bt2020,
}

/// Duration, resolution, frame rate, colorspace, and equirectangular-ness
/// of a probed source video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub colorspace: Colorspace,
    pub is_equirectangular: bool,
}

impl Default for VideoMetadata {
    fn default() -> Self {
        Self {
            duration_secs: 0.0,
            width: 0,
            height: 0,
            frame_rate: 30.0,
            colorspace: Colorspace::Unknown,
            is_equirectangular: false,
        }
    }
}

impl VideoMetadata {
    /// spec.md §4.4: true if width/height is within 2% of 2:1 and width is
    /// at least 2048px.
    pub fn detect_equirectangular(width: u32, height: u32) -> bool {
        if width < 2048 || height == 0 {
            return false;
        }
        let ratio = width as f64 / height as f64;
        (ratio - 2.0).abs() <= 0.02 * 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_equirectangular_within_tolerance() {
        assert!(VideoMetadata::detect_equirectangular(4096, 2048));
        assert!(VideoMetadata::detect_equirectangular(4096, 2040));
        assert!(!VideoMetadata::detect_equirectangular(4096, 2304));
        assert!(!VideoMetadata::detect_equirectangular(1920, 960));
    }
}
