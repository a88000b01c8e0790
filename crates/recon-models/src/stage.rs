//! The stage DAG and per-stage execution record (spec.md §3 StageExecution,
//! §4.10 Stage Graph).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The eight fixed stages, in DAG order. `Dense` may be skipped (spec.md
/// §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageKind {
    VideoAnalyze,
    ExtractFrames,
    Features,
    Matches,
    Sparse,
    Dense,
    Postprocess,
    Export,
}

impl StageKind {
    /// DAG order, also the order progress weights (spec.md §4.10) apply in.
    pub const ORDER: [StageKind; 8] = [
        StageKind::VideoAnalyze,
        StageKind::ExtractFrames,
        StageKind::Features,
        StageKind::Matches,
        StageKind::Sparse,
        StageKind::Dense,
        StageKind::Postprocess,
        StageKind::Export,
    ];

    /// Weighted contribution of each stage to overall job progress
    /// (spec.md §4.10: 0.02, 0.15, 0.15, 0.15, 0.20, 0.20, 0.08, 0.05).
    pub fn weight(self) -> f64 {
        match self {
            StageKind::VideoAnalyze => 0.02,
            StageKind::ExtractFrames => 0.15,
            StageKind::Features => 0.15,
            StageKind::Matches => 0.15,
            StageKind::Sparse => 0.20,
            StageKind::Dense => 0.20,
            StageKind::Postprocess => 0.08,
            StageKind::Export => 0.05,
        }
    }

    pub fn next(self) -> Option<StageKind> {
        let idx = Self::ORDER.iter().position(|&s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

/// Status of a single stage within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StageStatus::Completed
                | StageStatus::Failed
                | StageStatus::Skipped
                | StageStatus::Cancelled
        )
    }
}

/// Per-stage execution record (spec.md §3 StageExecution).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Monotonically non-decreasing fraction in [0, 1].
    pub progress: f64,
    pub activity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub artifacts: Vec<String>,
}

impl Default for StageExecution {
    fn default() -> Self {
        Self {
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            progress: 0.0,
            activity: String::new(),
            reason: None,
            artifacts: Vec::new(),
        }
    }
}

impl StageExecution {
    /// Advance progress, enforcing the monotonicity invariant (spec.md §8
    /// "Progress monotonicity").
    pub fn set_progress(&mut self, fraction: f64, activity: impl Into<String>) {
        let clamped = fraction.clamp(0.0, 1.0);
        if clamped > self.progress {
            self.progress = clamped;
        }
        self.activity = activity.into();
    }

    pub fn start(&mut self) {
        self.status = StageStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, artifacts: Vec<String>) {
        self.status = StageStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.progress = 1.0;
        self.artifacts = artifacts;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = StageStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.reason = Some(reason.into());
    }

    pub fn skip(&mut self) {
        self.status = StageStatus::Skipped;
        self.finished_at = Some(Utc::now());
        self.progress = 1.0;
    }

    pub fn cancel(&mut self) {
        self.status = StageStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }
}

/// The full per-job stage table, keyed by stage kind. Serializes to the
/// `stages` map in `progress.json` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageGraph {
    stages: BTreeMap<StageKind, StageExecution>,
}

impl StageGraph {
    pub fn new() -> Self {
        let stages = StageKind::ORDER
            .into_iter()
            .map(|k| (k, StageExecution::default()))
            .collect();
        Self { stages }
    }

    pub fn get(&self, kind: StageKind) -> &StageExecution {
        self.stages.get(&kind).expect("all stage kinds are present")
    }

    pub fn get_mut(&mut self, kind: StageKind) -> &mut StageExecution {
        self.stages.get_mut(&kind).expect("all stage kinds are present")
    }

    pub fn iter(&self) -> impl Iterator<Item = (StageKind, &StageExecution)> {
        self.stages.iter().map(|(k, v)| (*k, v))
    }

    /// First stage that is not `completed` or `skipped` — where the
    /// scheduler resumes from on restart (spec.md §4.10, §7 recovery
    /// posture).
    pub fn resume_point(&self) -> Option<StageKind> {
        StageKind::ORDER.into_iter().find(|&k| {
            !matches!(
                self.get(k).status,
                StageStatus::Completed | StageStatus::Skipped
            )
        })
    }

    /// Weighted overall progress (spec.md §4.10); skipped stages contribute
    /// their full weight.
    pub fn overall_progress(&self) -> f64 {
        StageKind::ORDER
            .into_iter()
            .map(|k| {
                let exec = self.get(k);
                let contribution = match exec.status {
                    StageStatus::Skipped => 1.0,
                    _ => exec.progress,
                };
                k.weight() * contribution
            })
            .sum()
    }

    pub fn all_completed_or_skipped(&self) -> bool {
        StageKind::ORDER.into_iter().all(|k| {
            matches!(
                self.get(k).status,
                StageStatus::Completed | StageStatus::Skipped
            )
        })
    }

    /// On orchestrator restart, any `running` stage is reset to `pending`
    /// (spec.md §7 recovery posture: stages are idempotent from their
    /// inputs, so a partially-run stage re-runs from scratch).
    pub fn reset_running_to_pending(&mut self) {
        for kind in StageKind::ORDER {
            let exec = self.get_mut(kind);
            if exec.status == StageStatus::Running {
                *exec = StageExecution::default();
            }
        }
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_progress_counts_skip_as_complete() {
        let mut g = StageGraph::new();
        for k in StageKind::ORDER {
            g.get_mut(k).complete(vec![]);
        }
        g.get_mut(StageKind::Dense).skip();
        assert!((g.overall_progress() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn resume_point_skips_completed_and_skipped() {
        let mut g = StageGraph::new();
        g.get_mut(StageKind::VideoAnalyze).complete(vec![]);
        g.get_mut(StageKind::ExtractFrames).complete(vec![]);
        assert_eq!(g.resume_point(), Some(StageKind::Features));
    }

    #[test]
    fn progress_is_monotonic() {
        let mut exec = StageExecution::default();
        exec.set_progress(0.5, "halfway");
        exec.set_progress(0.3, "regressed");
        assert_eq!(exec.progress, 0.5);
        exec.set_progress(0.9, "almost done");
        assert_eq!(exec.progress, 0.9);
    }
}
