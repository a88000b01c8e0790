//! Atomic `progress.json` persistence (spec.md §6, §8 "Atomic progress
//! file"): a dictionary of job state, per-stage execution records, and
//! timestamps, written via write-to-temp-then-rename so a reader never
//! observes a partial file.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use recon_layout::JobLayout;
use recon_models::{Job, ReconError, ReconResult, StageExecution, StageKind, StageStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressDocument {
    pub state: String,
    pub stages: BTreeMap<String, StageExecution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for ProgressDocument {
    fn from(job: &Job) -> Self {
        let stages = StageKind::ORDER
            .into_iter()
            .map(|kind| (stage_name(kind).to_string(), job.stages.get(kind).clone()))
            .collect();
        Self {
            state: job.state.as_str().to_string(),
            stages,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

fn stage_name(kind: StageKind) -> &'static str {
    match kind {
        StageKind::VideoAnalyze => "VIDEO_ANALYZE",
        StageKind::ExtractFrames => "EXTRACT_FRAMES",
        StageKind::Features => "FEATURES",
        StageKind::Matches => "MATCHES",
        StageKind::Sparse => "SPARSE",
        StageKind::Dense => "DENSE",
        StageKind::Postprocess => "POSTPROCESS",
        StageKind::Export => "EXPORT",
    }
}

/// Write `job`'s progress document to `layout`'s progress path, via a
/// sibling temp file and an atomic rename.
pub fn write_progress(layout: &JobLayout, job: &Job) -> ReconResult<()> {
    write_document(layout, &ProgressDocument::from(job))
}

pub fn read_progress(layout: &JobLayout) -> ReconResult<ProgressDocument> {
    let path = layout.progress_path();
    let bytes = std::fs::read(&path).map_err(|e| ReconError::io_error(path.display().to_string(), e))?;
    serde_json::from_slice(&bytes).map_err(|e| ReconError::MalformedBinary(format!("progress.json: {e}")))
}

fn write_document(layout: &JobLayout, document: &ProgressDocument) -> ReconResult<()> {
    std::fs::create_dir_all(layout.job_dir()).map_err(|e| ReconError::io_error(layout.job_dir().display().to_string(), e))?;
    let encoded = serde_json::to_vec_pretty(document).expect("ProgressDocument always serializes");

    let tmp_path = layout.progress_tmp_path();
    std::fs::write(&tmp_path, &encoded).map_err(|e| ReconError::io_error(tmp_path.display().to_string(), e))?;
    std::fs::rename(&tmp_path, layout.progress_path())
        .map_err(|e| ReconError::io_error(layout.progress_path().display().to_string(), e))
}

/// Cancel a job by mutating its on-disk progress document directly, for use
/// by a CLI invocation that is not the same process as the `run` daemon
/// that owns the job's in-memory `JobStore` (spec.md §6's CLI is a
/// separate, short-lived process per command). Idempotent: a job already
/// terminal is left untouched.
pub fn cancel_on_disk(layout: &JobLayout) -> ReconResult<()> {
    let mut document = read_progress(layout)?;
    if is_terminal_state(&document.state) {
        return Ok(());
    }

    document.state = "cancelled".to_string();
    for stage in document.stages.values_mut() {
        if !stage.status.is_terminal() {
            stage.status = StageStatus::Cancelled;
            stage.finished_at = Some(Utc::now());
        }
    }
    document.updated_at = Utc::now();
    write_document(layout, &document)
}

/// Remove a terminal job's workspace directory. Refuses with
/// `JobNotTerminal` otherwise (spec.md §6 `delete_job`).
pub fn delete_on_disk(layout: &JobLayout) -> ReconResult<()> {
    let document = read_progress(layout)?;
    if !is_terminal_state(&document.state) {
        return Err(ReconError::JobNotTerminal(layout.job_dir().display().to_string()));
    }
    std::fs::remove_dir_all(layout.job_dir()).map_err(|e| ReconError::io_error(layout.job_dir().display().to_string(), e))
}

fn is_terminal_state(state: &str) -> bool {
    matches!(state, "completed" | "failed" | "cancelled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_models::{base_table, JobId, QualityTag};

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let layout = JobLayout::new(dir.path(), JobId::from_string("j1"));
        let job = Job::new("video.mp4", QualityTag::Fast, base_table(QualityTag::Fast));

        write_progress(&layout, &job).unwrap();
        let document = read_progress(&layout).unwrap();
        assert_eq!(document.state, "pending");
        assert_eq!(document.stages.len(), 8);
        assert!(!layout.progress_tmp_path().exists());
    }

    #[test]
    fn cancel_on_disk_marks_pending_stages_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let layout = JobLayout::new(dir.path(), JobId::from_string("j2"));
        let job = Job::new("video.mp4", QualityTag::Fast, base_table(QualityTag::Fast));
        write_progress(&layout, &job).unwrap();

        cancel_on_disk(&layout).unwrap();
        let document = read_progress(&layout).unwrap();
        assert_eq!(document.state, "cancelled");
        assert!(document.stages.values().all(|s| s.status == StageStatus::Cancelled));
    }

    #[test]
    fn delete_on_disk_refuses_non_terminal_job() {
        let dir = tempfile::tempdir().unwrap();
        let layout = JobLayout::new(dir.path(), JobId::from_string("j3"));
        let job = Job::new("video.mp4", QualityTag::Fast, base_table(QualityTag::Fast));
        write_progress(&layout, &job).unwrap();

        let result = delete_on_disk(&layout);
        assert!(matches!(result, Err(ReconError::JobNotTerminal(_))));
        assert!(layout.job_dir().exists());
    }
}
