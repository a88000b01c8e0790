//! The Quality Model (spec.md §4.3): resolves a `(QualityTag, VideoMetadata)`
//! pair into an immutable `ParameterRecord`.

use recon_models::{base_table, MatcherKind, ParameterRecord, QualityTag, VideoMetadata};

/// Resolve a `ParameterRecord` from a quality tag and probed video metadata
/// (spec.md §4.3's base table plus the equirectangular / frame-rate
/// adjustments). Pure and total: never fails.
pub fn resolve(tag: QualityTag, video: &VideoMetadata) -> ParameterRecord {
    let mut record = base_table(tag);

    if video.is_equirectangular {
        // Eight perspective views per source frame demand more overlap and
        // a halved per-view feature budget (spec.md §4.3).
        record.matcher = MatcherKind::SequentialWithOverlap(20);
        record.feature_budget_per_image /= 2;
    }

    if video.frame_rate > 30.0 {
        let uncapped = 8.0 * video.duration_secs.max(0.0).sqrt() * tag.frame_count_multiplier();
        let capped = uncapped.min(600.0).max(0.0).round() as u32;
        record.target_frame_count = Some(capped);
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_models::Colorspace;

    fn video(is_360: bool, fps: f64) -> VideoMetadata {
        VideoMetadata {
            duration_secs: 100.0,
            width: if is_360 { 4096 } else { 1920 },
            height: if is_360 { 2048 } else { 1080 },
            frame_rate: fps,
            colorspace: Colorspace::Bt709,
            is_equirectangular: is_360,
        }
    }

    #[test]
    fn parameter_monotonicity_across_tiers() {
        let tiers = [QualityTag::Fast, QualityTag::Medium, QualityTag::High, QualityTag::Ultra];
        let records: Vec<_> = tiers.iter().map(|&t| resolve(t, &video(false, 24.0))).collect();

        for pair in records.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.feature_budget_per_image <= b.feature_budget_per_image);
            assert!(a.max_matches_per_pair <= b.max_matches_per_pair);
            assert!(a.patchmatch_samples <= b.patchmatch_samples);
            assert!(a.patchmatch_iterations <= b.patchmatch_iterations);
            assert!(a.ba_local_iterations <= b.ba_local_iterations);
            assert!(a.ba_global_iterations <= b.ba_global_iterations);
            assert!(a.fusion_max_reprojection_error >= b.fusion_max_reprojection_error);
            assert!(a.postprocess_voxel_size_m >= b.postprocess_voxel_size_m);
        }
    }

    #[test]
    fn equirectangular_halves_feature_budget_and_widens_overlap() {
        let flat = resolve(QualityTag::Medium, &video(false, 24.0));
        let equirect = resolve(QualityTag::Medium, &video(true, 24.0));
        assert_eq!(equirect.feature_budget_per_image, flat.feature_budget_per_image / 2);
        assert_eq!(equirect.matcher, MatcherKind::SequentialWithOverlap(20));
    }

    #[test]
    fn high_frame_rate_caps_target_frame_count() {
        let mut fast_video = video(false, 60.0);
        fast_video.duration_secs = 10000.0;
        let record = resolve(QualityTag::Ultra, &fast_video);
        assert_eq!(record.target_frame_count, Some(600));
    }
}
