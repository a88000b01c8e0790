//! Frame extraction (spec.md §4.5): uniform-stride JPEG sequence for flat
//! video, eight-view pinhole synthesis per sampled frame for equirectangular
//! video.

use std::path::Path;
use std::process::{Command, Stdio};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use recon_layout::JobLayout;
use recon_models::ReconError;
use tracing::debug;

use crate::reproject::{reproject_pinhole, FIELD_OF_VIEW_DEG, YAW_ANGLES_DEG};

const JPEG_QUALITY: u8 = 92;

/// Extraction inputs resolved from the job's `ParameterRecord` and probed
/// `VideoMetadata` (spec.md §4.5).
#[derive(Debug, Clone, Copy)]
pub struct ExtractionPlan {
    pub target_count: u32,
    pub is_equirectangular: bool,
    pub max_image_side: u32,
    pub duration_secs: f64,
}

/// Extract the numbered JPEG sequence described by `plan`, calling
/// `on_progress(fraction)` after every source frame is processed (spec.md
/// §4.5's "frames processed / frames planned").
///
/// Returns the number of frames actually written. Fails with
/// `FrameExtractionFailed` if fewer than `max(4, ceil(target/4))` frames were
/// produced.
pub fn extract_frames(
    video_path: &Path,
    layout: &JobLayout,
    plan: &ExtractionPlan,
    mut on_progress: impl FnMut(f64),
) -> Result<usize, ReconError> {
    std::fs::create_dir_all(layout.images_dir()).map_err(|e| ReconError::io_error(layout.images_dir().display().to_string(), e))?;

    let ffmpeg = which::which("ffmpeg").map_err(|_| ReconError::UnreadableVideo("ffmpeg not found on PATH".into()))?;

    let planned = plan.target_count.max(1);
    let mut produced = 0usize;
    let mut frame_index = 0u32;

    for source_idx in 0..planned {
        let timestamp = if planned == 1 {
            0.0
        } else {
            plan.duration_secs * source_idx as f64 / (planned - 1) as f64
        };

        match capture_source_frame(&ffmpeg, video_path, timestamp) {
            Ok(frame) => {
                if plan.is_equirectangular {
                    for yaw in YAW_ANGLES_DEG {
                        let view = reproject_pinhole(&frame, yaw, 0.0, FIELD_OF_VIEW_DEG, frame.height().min(plan.max_image_side));
                        let out_path = layout.frame_path(frame_index, "jpg");
                        save_jpeg(&DynamicImage::ImageRgb8(view), &out_path, plan.max_image_side)?;
                        frame_index += 1;
                        produced += 1;
                    }
                } else {
                    let out_path = layout.frame_path(frame_index, "jpg");
                    save_jpeg(&frame, &out_path, plan.max_image_side)?;
                    frame_index += 1;
                    produced += 1;
                }
            }
            Err(err) => {
                debug!(?err, source_idx, "frame capture failed, continuing");
            }
        }

        on_progress((source_idx + 1) as f64 / planned as f64);
    }

    let minimum = (plan.target_count as f64 / 4.0).ceil().max(4.0) as usize;
    if produced < minimum {
        return Err(ReconError::FrameExtractionFailed { produced, planned: plan.target_count as usize });
    }

    Ok(produced)
}

fn capture_source_frame(ffmpeg: &Path, video_path: &Path, timestamp_secs: f64) -> Result<DynamicImage, ReconError> {
    let output = Command::new(ffmpeg)
        .args(["-ss", &format!("{timestamp_secs:.3}"), "-i"])
        .arg(video_path)
        .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ReconError::io_error(video_path.display().to_string(), e))?;

    if !output.status.success() || output.stdout.is_empty() {
        return Err(ReconError::UnreadableVideo(format!(
            "ffmpeg could not capture frame at {timestamp_secs:.3}s: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    image::load_from_memory(&output.stdout)
        .map_err(|e| ReconError::UnreadableVideo(format!("could not decode captured frame: {e}")))
}

fn save_jpeg(image: &DynamicImage, path: &Path, max_side: u32) -> Result<(), ReconError> {
    let (width, height) = image.dimensions();
    let longer_side = width.max(height);

    let resized = if longer_side > max_side {
        let scale = max_side as f64 / longer_side as f64;
        let new_w = ((width as f64) * scale).round().max(1.0) as u32;
        let new_h = ((height as f64) * scale).round().max(1.0) as u32;
        image.resize(new_w, new_h, FilterType::Lanczos3)
    } else {
        image.clone()
    };

    let mut bytes = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .encode_image(&resized)
        .map_err(|e| ReconError::io_error(path.display().to_string(), e))?;

    std::fs::write(path, bytes).map_err(|e| ReconError::io_error(path.display().to_string(), e))
}
