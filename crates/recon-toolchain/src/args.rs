//! Static CLI-argument-mapping table from `ParameterRecord`/layout paths to
//! the external toolchain's subprocess arguments (spec.md §4.6). Swapping
//! toolchain versions means editing this module, per spec.md §6.

use recon_layout::JobLayout;
use recon_models::{MatcherKind, ParameterRecord, StageKind};

/// One subprocess invocation: a binary name and its argument vector.
#[derive(Debug, Clone)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Build the subprocess command for `stage` given the job's resolved
/// parameters and artifact layout. Only FEATURES/MATCHES/SPARSE/DENSE are
/// driven through the external toolchain; other stages are not.
pub fn build_command(stage: StageKind, params: &ParameterRecord, layout: &JobLayout, sparse_index: u32) -> StageCommand {
    match stage {
        StageKind::Features => StageCommand {
            program: "colmap".into(),
            args: vec![
                "feature_extractor".into(),
                "--database_path".into(),
                layout.database_path("db").display().to_string(),
                "--image_path".into(),
                layout.images_dir().display().to_string(),
                "--ImageReader.single_camera".into(),
                "1".into(),
                "--SiftExtraction.max_image_size".into(),
                params.max_image_side.to_string(),
                "--SiftExtraction.max_num_features".into(),
                params.feature_budget_per_image.to_string(),
            ],
        },
        StageKind::Matches => {
            let mut args = vec!["--database_path".to_string(), layout.database_path("db").display().to_string()];
            let matcher_subcommand = match params.matcher {
                MatcherKind::SequentialWithOverlap(k) => {
                    args.push("--SequentialMatching.overlap".into());
                    args.push(k.to_string());
                    "sequential_matcher"
                }
                MatcherKind::Exhaustive => "exhaustive_matcher",
                MatcherKind::Spatial => "spatial_matcher",
            };
            args.insert(0, matcher_subcommand.to_string());
            args.push("--SiftMatching.max_num_matches".into());
            args.push(params.max_matches_per_pair.to_string());
            args.push("--SiftMatching.cross_check".into());
            args.push(if params.cross_check { "1".into() } else { "0".into() });
            StageCommand { program: "colmap".into(), args }
        }
        StageKind::Sparse => StageCommand {
            program: "colmap".into(),
            args: vec![
                "mapper".into(),
                "--database_path".into(),
                layout.database_path("db").display().to_string(),
                "--image_path".into(),
                layout.images_dir().display().to_string(),
                "--output_path".into(),
                layout.job_dir().join("sparse").display().to_string(),
                "--Mapper.ba_local_max_num_iterations".into(),
                params.ba_local_iterations.to_string(),
                "--Mapper.ba_global_max_num_iterations".into(),
                params.ba_global_iterations.to_string(),
            ],
        },
        StageKind::Dense => StageCommand {
            program: "colmap".into(),
            args: vec![
                "patch_match_stereo".into(),
                "--workspace_path".into(),
                layout.job_dir().join("dense").display().to_string(),
                "--PatchMatchStereo.window_radius".into(),
                params.patchmatch_window_radius.to_string(),
                "--PatchMatchStereo.num_samples".into(),
                params.patchmatch_samples.to_string(),
                "--PatchMatchStereo.num_iterations".into(),
                params.patchmatch_iterations.to_string(),
                "--PatchMatchStereo.geom_consistency".into(),
                if params.patchmatch_geometric_consistency { "true".into() } else { "false".into() },
            ],
        },
        other => panic!("stage {other:?} is not driven through the external toolchain; index={sparse_index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_models::{JobId, QualityTag};

    #[test]
    fn features_command_carries_feature_budget() {
        let layout = JobLayout::new("/work", JobId::from_string("j1"));
        let params = recon_models::base_table(QualityTag::Medium);
        let cmd = build_command(StageKind::Features, &params, &layout, 0);
        assert_eq!(cmd.program, "colmap");
        assert!(cmd.args.contains(&params.feature_budget_per_image.to_string()));
    }

    #[test]
    fn sequential_matcher_carries_overlap_k() {
        let layout = JobLayout::new("/work", JobId::from_string("j1"));
        let mut params = recon_models::base_table(QualityTag::Fast);
        params.matcher = MatcherKind::SequentialWithOverlap(20);
        let cmd = build_command(StageKind::Matches, &params, &layout, 0);
        assert_eq!(cmd.args[0], "sequential_matcher");
        assert!(cmd.args.contains(&"20".to_string()));
    }
}
