//! Quality tags and the fully-resolved `ParameterRecord` (spec.md §3, §4.3).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReconError, ReconResult};

/// A user-facing quality tag (spec.md §6 `submit_job`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTag {
    Fast,
    Medium,
    High,
    Ultra,
}

impl QualityTag {
    pub fn parse(s: &str) -> ReconResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(QualityTag::Fast),
            "medium" => Ok(QualityTag::Medium),
            "high" => Ok(QualityTag::High),
            "ultra" => Ok(QualityTag::Ultra),
            other => Err(ReconError::InvalidQualityTag(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTag::Fast => "fast",
            QualityTag::Medium => "medium",
            QualityTag::High => "high",
            QualityTag::Ultra => "ultra",
        }
    }

    /// Per-stage subprocess deadline (spec.md §4.6): 20/60/180/360 minutes.
    pub fn stage_timeout(self) -> Duration {
        let minutes = match self {
            QualityTag::Fast => 20,
            QualityTag::Medium => 60,
            QualityTag::High => 180,
            QualityTag::Ultra => 360,
        };
        Duration::from_secs(minutes * 60)
    }

    /// Frame-count quality multiplier used by the extractor's target-count
    /// cap (spec.md §4.3): 0.5 / 1.0 / 1.3 / 1.6.
    pub fn frame_count_multiplier(self) -> f64 {
        match self {
            QualityTag::Fast => 0.5,
            QualityTag::Medium => 1.0,
            QualityTag::High => 1.3,
            QualityTag::Ultra => 1.6,
        }
    }
}

/// Matcher strategy the external toolchain uses to pair candidate images
/// (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "overlap_k")]
pub enum MatcherKind {
    SequentialWithOverlap(u32),
    Exhaustive,
    Spatial,
}

/// Output format the Export stage writes (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Ply,
}

/// An immutable, fully-resolved configuration built once from a
/// `(QualityTag, VideoMetadata)` pair (spec.md §3 ParameterRecord). Later
/// stages consult it but never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub quality_tag: QualityTag,

    pub max_image_side: u32,
    pub feature_budget_per_image: u32,

    pub matcher: MatcherKind,
    pub max_matches_per_pair: u32,
    pub cross_check: bool,

    pub ba_local_iterations: u32,
    pub ba_global_iterations: u32,

    pub patchmatch_window_radius: u32,
    pub patchmatch_samples: u32,
    pub patchmatch_iterations: u32,
    pub patchmatch_geometric_consistency: bool,

    pub dense_stereo_enabled: bool,
    pub fusion_min_pixels: u32,
    pub fusion_max_reprojection_error: f64,
    pub fusion_max_depth_error: f64,
    pub fusion_max_normal_error_deg: f64,

    pub postprocess_voxel_size_m: f64,
    pub postprocess_outlier_sigma: f64,

    pub output_format: OutputFormat,

    pub stage_timeout: Duration,

    /// Target frame count proposed for extraction (spec.md §4.3 frame-rate
    /// adjustment); `None` when the uncapped uniform-stride default applies.
    pub target_frame_count: Option<u32>,
}

impl ParameterRecord {
    /// FNV-1a over the canonical JSON encoding; used as the "run kind"
    /// identifier for `params.json` (spec.md §6).
    pub fn content_hash(&self) -> String {
        let encoded = serde_json::to_vec(self).expect("ParameterRecord always serializes");
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in encoded {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        format!("{hash:016x}")
    }
}

/// Base per-tier table (spec.md §4.3), before the equirectangular and
/// frame-rate adjustments `recon_quality::resolve` applies. Exposed so the
/// resolver crate can build on it without duplicating the table.
pub fn base_table(tag: QualityTag) -> ParameterRecord {
    let (
        max_image_side,
        feature_budget_per_image,
        matcher,
        max_matches_per_pair,
        ba_local_iterations,
        ba_global_iterations,
        patchmatch_window_radius,
        patchmatch_samples,
        patchmatch_iterations,
        dense_stereo_enabled,
        fusion_min_pixels,
        fusion_max_reprojection_error,
        postprocess_voxel_size_m,
        postprocess_outlier_sigma,
    ): (u32, u32, MatcherKind, u32, u32, u32, u32, u32, u32, bool, u32, f64, f64, f64) = match tag {
        QualityTag::Fast => (
            2048,
            16384,
            MatcherKind::SequentialWithOverlap(10),
            32768,
            25,
            50,
            5,
            15,
            5,
            false,
            5,
            2.0,
            0.01,
            2.0,
        ),
        QualityTag::Medium => (
            4096,
            32768,
            MatcherKind::Exhaustive,
            65536,
            40,
            100,
            7,
            30,
            7,
            true,
            4,
            2.5,
            0.005,
            2.0,
        ),
        QualityTag::High => (
            4096,
            65536,
            MatcherKind::Exhaustive,
            131072,
            50,
            150,
            7,
            50,
            7,
            true,
            3,
            2.5,
            0.003,
            1.5,
        ),
        QualityTag::Ultra => (
            8192,
            65536,
            MatcherKind::Exhaustive,
            262144,
            50,
            150,
            11,
            50,
            10,
            true,
            3,
            2.5,
            0.002,
            1.5,
        ),
    };

    ParameterRecord {
        quality_tag: tag,
        max_image_side,
        feature_budget_per_image,
        matcher,
        max_matches_per_pair,
        cross_check: true,
        ba_local_iterations,
        ba_global_iterations,
        patchmatch_window_radius,
        patchmatch_samples,
        patchmatch_iterations,
        patchmatch_geometric_consistency: true,
        dense_stereo_enabled,
        fusion_min_pixels,
        fusion_max_reprojection_error,
        fusion_max_depth_error: 0.01,
        fusion_max_normal_error_deg: 10.0,
        postprocess_voxel_size_m,
        postprocess_outlier_sigma,
        output_format: OutputFormat::Ply,
        stage_timeout: tag.stage_timeout(),
        target_frame_count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_sensitive_to_changes() {
        let a = base_table(QualityTag::Fast);
        let b = base_table(QualityTag::Fast);
        let c = base_table(QualityTag::Medium);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn base_table_is_monotonic_across_tiers() {
        let tiers = [QualityTag::Fast, QualityTag::Medium, QualityTag::High, QualityTag::Ultra];
        let records: Vec<_> = tiers.iter().map(|&t| base_table(t)).collect();
        for pair in records.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.feature_budget_per_image <= b.feature_budget_per_image);
            assert!(a.fusion_max_reprojection_error >= b.fusion_max_reprojection_error);
        }
    }
}
