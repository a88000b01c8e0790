//! Canonical artifact paths for a reconstruction job (spec.md §4.1).
//!
//! Every function here is a pure path computation: no filesystem access, no
//! directory creation. Callers that need the directories to exist create
//! them explicitly before writing.

use std::path::{Path, PathBuf};

use recon_models::JobId;

/// The fixed layout rooted at `<root>/<job>/` (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct JobLayout {
    root: PathBuf,
    job: JobId,
}

impl JobLayout {
    pub fn new(root: impl Into<PathBuf>, job: JobId) -> Self {
        Self { root: root.into(), job }
    }

    /// `<root>/<job>/`
    pub fn job_dir(&self) -> PathBuf {
        self.root.join(self.job.as_str())
    }

    /// `<root>/<job>/images/`
    pub fn images_dir(&self) -> PathBuf {
        self.job_dir().join("images")
    }

    /// `<root>/<job>/images/frame_NNNNNN.<ext>`, six-digit zero-padded.
    pub fn frame_path(&self, index: u32, ext: &str) -> PathBuf {
        self.images_dir().join(format!("frame_{index:06}.{ext}"))
    }

    /// `<root>/<job>/database.<ext>` — opaque to us, owned by the external
    /// toolchain.
    pub fn database_path(&self, ext: &str) -> PathBuf {
        self.job_dir().join(format!("database.{ext}"))
    }

    /// `<root>/<job>/sparse/<k>/`
    pub fn sparse_model_dir(&self, k: u32) -> PathBuf {
        self.job_dir().join("sparse").join(k.to_string())
    }

    /// `<root>/<job>/sparse/<k>/cameras.<binary-ext>`
    pub fn sparse_cameras_path(&self, k: u32, ext: &str) -> PathBuf {
        self.sparse_model_dir(k).join(format!("cameras.{ext}"))
    }

    /// `<root>/<job>/sparse/<k>/images.<binary-ext>`
    pub fn sparse_images_path(&self, k: u32, ext: &str) -> PathBuf {
        self.sparse_model_dir(k).join(format!("images.{ext}"))
    }

    /// `<root>/<job>/sparse/<k>/points3D.<binary-ext>`
    pub fn sparse_points3d_path(&self, k: u32, ext: &str) -> PathBuf {
        self.sparse_model_dir(k).join(format!("points3D.{ext}"))
    }

    /// `<root>/<job>/sparse/point_cloud.ply`
    pub fn sparse_point_cloud_path(&self) -> PathBuf {
        self.job_dir().join("sparse").join("point_cloud.ply")
    }

    /// `<root>/<job>/dense/images/`
    pub fn dense_images_dir(&self) -> PathBuf {
        self.job_dir().join("dense").join("images")
    }

    /// `<root>/<job>/dense/sparse/`
    pub fn dense_sparse_dir(&self) -> PathBuf {
        self.job_dir().join("dense").join("sparse")
    }

    /// `<root>/<job>/dense/stereo/`
    pub fn dense_stereo_dir(&self) -> PathBuf {
        self.job_dir().join("dense").join("stereo")
    }

    /// `<root>/<job>/dense/fused.ply`
    pub fn dense_fused_path(&self) -> PathBuf {
        self.job_dir().join("dense").join("fused.ply")
    }

    /// `<root>/<job>/postprocessed.ply`
    pub fn postprocessed_path(&self) -> PathBuf {
        self.job_dir().join("postprocessed.ply")
    }

    /// `<root>/<job>/thumbnail.jpg`
    pub fn thumbnail_path(&self) -> PathBuf {
        self.job_dir().join("thumbnail.jpg")
    }

    /// `<root>/<job>/progress.json`
    pub fn progress_path(&self) -> PathBuf {
        self.job_dir().join("progress.json")
    }

    /// `<root>/<job>/progress.json.tmp` — the temp file the atomic writer
    /// renames into place (spec.md §7 recovery posture).
    pub fn progress_tmp_path(&self) -> PathBuf {
        self.job_dir().join("progress.json.tmp")
    }

    /// `<root>/<job>/params.json`
    pub fn params_path(&self) -> PathBuf {
        self.job_dir().join("params.json")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job(&self) -> &JobId {
        &self.job
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_path_is_six_digit_zero_padded() {
        let layout = JobLayout::new("/work", JobId::from_string("abc"));
        assert_eq!(layout.frame_path(7, "jpg"), PathBuf::from("/work/abc/images/frame_000007.jpg"));
        assert_eq!(layout.frame_path(123456, "jpg"), PathBuf::from("/work/abc/images/frame_123456.jpg"));
    }

    #[test]
    fn paths_are_pure_functions_of_root_and_job() {
        let layout = JobLayout::new("/work", JobId::from_string("j1"));
        assert_eq!(layout.sparse_cameras_path(0, "bin"), PathBuf::from("/work/j1/sparse/0/cameras.bin"));
        assert_eq!(layout.sparse_cameras_path(2, "bin"), PathBuf::from("/work/j1/sparse/2/cameras.bin"));
        assert_eq!(layout.dense_fused_path(), PathBuf::from("/work/j1/dense/fused.ply"));
        assert_eq!(layout.progress_path(), PathBuf::from("/work/j1/progress.json"));
    }
}
