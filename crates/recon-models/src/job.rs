//! Job identity and top-level job record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::params::{ParameterRecord, QualityTag};
use crate::stage::StageGraph;

/// Unique identifier for a reconstruction job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall job state, distinct from any single stage's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Terminal states never transition further (spec.md §3's Job invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// A user-submitted reconstruction job. Created once, never mutated after
/// reaching a terminal state (spec.md §3's Job invariant); deleted only
/// after the execution record is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub video_path: String,
    pub quality_tag: QualityTag,
    pub params: ParameterRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: JobState,
    pub stages: StageGraph,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Job {
    pub fn new(video_path: impl Into<String>, quality_tag: QualityTag, params: ParameterRecord) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            video_path: video_path.into(),
            quality_tag,
            params,
            created_at: now,
            updated_at: now,
            state: JobState::Pending,
            stages: StageGraph::new(),
            failure_reason: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn mark_running(&mut self) {
        self.state = JobState::Running;
        self.touch();
    }

    pub fn mark_completed(&mut self) {
        self.state = JobState::Completed;
        self.touch();
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = JobState::Failed;
        self.failure_reason = Some(reason.into());
        self.touch();
    }

    pub fn mark_cancelled(&mut self) {
        // Idempotent: cancelling an already-terminal job is a no-op.
        if self.state.is_terminal() {
            return;
        }
        self.state = JobState::Cancelled;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        let displayed = id.to_string();
        assert_eq!(displayed, id.as_str());
    }

    #[test]
    fn cancel_is_idempotent_once_terminal() {
        let mut job = Job::new("v.mp4", QualityTag::Fast, crate::params::base_table(QualityTag::Fast));
        job.mark_completed();
        let updated_at = job.updated_at;
        job.mark_cancelled();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.updated_at, updated_at);
    }
}
