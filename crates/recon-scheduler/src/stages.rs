//! Per-stage work functions the orchestrator drives through (spec.md §4.10).
//! Each stage reads its inputs from disk and the job record, does its work,
//! and returns the artifact paths it produced; nothing here tracks state
//! across calls, so a re-run after a crash starts from scratch (spec.md §7).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use recon_layout::JobLayout;
use recon_models::{DensePointCloud, Job, ReconError, ReconResult, Reconstruction, StageKind};

const SPARSE_MODEL_SEARCH_LIMIT: u32 = 16;
/// `DENSE` is skipped if the sparse reconstruction has fewer points than
/// this (spec.md §4.10).
pub const DENSE_MIN_SPARSE_POINTS: usize = 100;

pub fn run(
    stage: StageKind,
    job: &Job,
    layout: &JobLayout,
    cancel: &AtomicBool,
    on_progress: impl FnMut(f64),
) -> ReconResult<Vec<String>> {
    match stage {
        StageKind::VideoAnalyze => video_analyze(job, layout),
        StageKind::ExtractFrames => extract_frames(job, layout, on_progress),
        StageKind::Features | StageKind::Matches | StageKind::Dense => {
            toolchain_stage(stage, job, layout, cancel, on_progress)
        }
        StageKind::Sparse => sparse(job, layout, cancel, on_progress),
        StageKind::Postprocess => postprocess(job, layout),
        StageKind::Export => export(job, layout),
    }
}

fn video_analyze(job: &Job, layout: &JobLayout) -> ReconResult<Vec<String>> {
    let video = recon_video::probe_video(&job.video_path)?;
    let path = layout.job_dir().join("video_metadata.json");
    std::fs::create_dir_all(layout.job_dir()).map_err(|e| ReconError::io_error(layout.job_dir().display().to_string(), e))?;
    let encoded = serde_json::to_vec_pretty(&video).expect("VideoMetadata always serializes");
    std::fs::write(&path, encoded).map_err(|e| ReconError::io_error(path.display().to_string(), e))?;
    Ok(vec![path.display().to_string()])
}

/// Default extraction target when the quality model didn't cap one (fps <=
/// 30): one sampled frame every two seconds, clamped to the same [4, 600]
/// range the high-frame-rate cap uses.
fn default_target_frame_count(duration_secs: f64) -> u32 {
    (duration_secs / 2.0).round().clamp(4.0, 600.0) as u32
}

fn extract_frames(job: &Job, layout: &JobLayout, on_progress: impl FnMut(f64)) -> ReconResult<Vec<String>> {
    let video = recon_video::probe_video(&job.video_path)?;
    let target_count = job.params.target_frame_count.unwrap_or_else(|| default_target_frame_count(video.duration_secs));

    let plan = recon_video::ExtractionPlan {
        target_count,
        is_equirectangular: video.is_equirectangular,
        max_image_side: job.params.max_image_side,
        duration_secs: video.duration_secs,
    };

    let video_path = PathBuf::from(&job.video_path);
    let produced = recon_video::extract_frames(&video_path, layout, &plan, on_progress)?;
    Ok(vec![format!("{} frames in {}", produced, layout.images_dir().display())])
}

fn toolchain_stage(
    stage: StageKind,
    job: &Job,
    layout: &JobLayout,
    cancel: &AtomicBool,
    on_progress: impl FnMut(f64),
) -> ReconResult<Vec<String>> {
    let command = recon_toolchain::build_command(stage, &job.params, layout, 0);
    recon_toolchain::run_stage_cancellable(stage, &command, job.params.stage_timeout, cancel, on_progress)?;
    Ok(vec![format!("{} {}", command.program, command.args.join(" "))])
}

fn sparse(job: &Job, layout: &JobLayout, cancel: &AtomicBool, on_progress: impl FnMut(f64)) -> ReconResult<Vec<String>> {
    let command = recon_toolchain::build_command(StageKind::Sparse, &job.params, layout, 0);
    recon_toolchain::run_stage_cancellable(StageKind::Sparse, &command, job.params.stage_timeout, cancel, on_progress)?;

    let canonical = canonical_sparse_reconstruction(layout)?;
    let cloud = DensePointCloud::from(&canonical);

    let ply_path = layout.sparse_point_cloud_path();
    let file = File::create(&ply_path).map_err(|e| ReconError::io_error(ply_path.display().to_string(), e))?;
    let mut writer = BufWriter::new(file);
    recon_format::write_ply(&mut writer, &cloud)?;

    Ok(vec![ply_path.display().to_string()])
}

/// The external toolchain may emit multiple sparse models (one per
/// connected component of the view graph) under `sparse/0`, `sparse/1`, ...;
/// spec.md §3 says the orchestrator picks the one of maximum point
/// cardinality. Absence of any model is not itself an error — it yields an
/// empty reconstruction, which in turn causes `DENSE` to be skipped.
fn canonical_sparse_reconstruction(layout: &JobLayout) -> ReconResult<Reconstruction> {
    let mut best = Reconstruction::default();

    for k in 0..SPARSE_MODEL_SEARCH_LIMIT {
        let cameras_path = layout.sparse_cameras_path(k, "bin");
        let images_path = layout.sparse_images_path(k, "bin");
        let points_path = layout.sparse_points3d_path(k, "bin");
        if !cameras_path.exists() || !images_path.exists() || !points_path.exists() {
            continue;
        }

        let cameras = recon_format::read_cameras(&mut open(&cameras_path)?)?;
        let images = recon_format::read_images(&mut open(&images_path)?)?;
        let points = recon_format::read_points3d(&mut open(&points_path)?)?;
        let candidate = Reconstruction { cameras, images, points };
        candidate.check_integrity()?;

        if candidate.point_count() > best.point_count() {
            best = candidate;
        }
    }

    Ok(best)
}

fn open(path: &std::path::Path) -> ReconResult<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| ReconError::io_error(path.display().to_string(), e))
}

fn postprocess(job: &Job, layout: &JobLayout) -> ReconResult<Vec<String>> {
    let source_path = if layout.dense_fused_path().exists() {
        layout.dense_fused_path()
    } else {
        layout.sparse_point_cloud_path()
    };

    let cloud = recon_format::read_ply(&mut open(&source_path)?)?;

    let cleaned = recon_postprocess::remove_statistical_outliers(&cloud, job.params.postprocess_outlier_sigma);
    let downsampled = recon_postprocess::voxel_downsample(&cleaned, job.params.postprocess_voxel_size_m);
    let viewpoint = viewpoint_above(&downsampled);
    let with_normals = recon_postprocess::estimate_normals(&downsampled, viewpoint);

    let out_path = layout.postprocessed_path();
    let file = File::create(&out_path).map_err(|e| ReconError::io_error(out_path.display().to_string(), e))?;
    let mut writer = BufWriter::new(file);
    recon_format::write_ply(&mut writer, &with_normals)?;

    Ok(vec![out_path.display().to_string()])
}

/// A synthetic viewpoint above the cloud's bounding box, used to orient
/// estimated normals consistently when no camera poses are carried into
/// post-processing (a `DensePointCloud` has none, by spec.md §3's
/// definition distinguishing it from a sparse `Reconstruction`).
fn viewpoint_above(cloud: &DensePointCloud) -> [f64; 3] {
    match cloud.bounding_box() {
        Some(bbox) => {
            let center = bbox.center();
            let extent = (bbox.max[2] - bbox.min[2]).max(1.0);
            [center[0], center[1], bbox.max[2] + extent]
        }
        None => [0.0, 0.0, 1.0],
    }
}

fn export(_job: &Job, layout: &JobLayout) -> ReconResult<Vec<String>> {
    let mut artifacts = vec![layout.postprocessed_path().display().to_string()];

    let first_frame = layout.frame_path(0, "jpg");
    if first_frame.exists() {
        let thumbnail = layout.thumbnail_path();
        std::fs::copy(&first_frame, &thumbnail).map_err(|e| ReconError::io_error(thumbnail.display().to_string(), e))?;
        artifacts.push(thumbnail.display().to_string());
    }

    Ok(artifacts)
}

/// Whether `DENSE` should be skipped for this job: disabled in the
/// parameter record, or the canonical sparse reconstruction has too few
/// points to densify meaningfully (spec.md §4.10).
pub fn should_skip_dense(job: &Job, layout: &JobLayout) -> bool {
    if !job.params.dense_stereo_enabled {
        return true;
    }
    let ply_path = layout.sparse_point_cloud_path();
    let Ok(mut reader) = open(&ply_path) else { return true };
    match recon_format::read_ply(&mut reader) {
        Ok(cloud) => cloud.len() < DENSE_MIN_SPARSE_POINTS,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target_frame_count_is_clamped() {
        assert_eq!(default_target_frame_count(1.0), 4);
        assert_eq!(default_target_frame_count(20.0), 10);
        assert_eq!(default_target_frame_count(10000.0), 600);
    }

    #[test]
    fn viewpoint_above_empty_cloud_is_a_safe_default() {
        let cloud = DensePointCloud::new(vec![]);
        assert_eq!(viewpoint_above(&cloud), [0.0, 0.0, 1.0]);
    }
}
