//! The closed error taxonomy shared across every pipeline component.
//!
//! Every kind named by the reconstruction pipeline's failure surface is a
//! variant here. Stage code never invents a parallel error type; crates that
//! need extra context wrap it into one of these variants at their boundary.

use thiserror::Error;

use crate::stage::StageKind;

pub type ReconResult<T> = Result<T, ReconError>;

#[derive(Debug, Error)]
pub enum ReconError {
    // --- submission / input errors, surfaced directly ---
    #[error("invalid quality tag: {0}")]
    InvalidQualityTag(String),

    #[error("invalid reference distance: {0}")]
    InvalidReference(String),

    #[error("degenerate calibration: picked points are coincident")]
    DegenerateCalibration,

    #[error("submission queue is full")]
    QueueFull,

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job is not in a terminal state: {0}")]
    JobNotTerminal(String),

    // --- VIDEO_ANALYZE / EXTRACT_FRAMES, terminal for the job ---
    #[error("video could not be opened: {0}")]
    UnreadableVideo(String),

    #[error("video codec is unsupported: {0}")]
    UnsupportedCodec(String),

    #[error("frame extraction failed: only {produced} of {planned} planned frames were produced")]
    FrameExtractionFailed { produced: usize, planned: usize },

    // --- external toolchain stages ---
    #[error("stage {stage:?} failed with exit code {exit_code:?}: {tail}")]
    StageFailed {
        stage: StageKind,
        exit_code: Option<i32>,
        tail: String,
    },

    #[error("stage {0:?} timed out")]
    StageTimeout(StageKind),

    #[error("stage was cancelled")]
    StageCancelled,

    // --- C2 parsing, terminal for the job ---
    #[error("malformed binary model file: {0}")]
    MalformedBinary(String),

    #[error("unknown camera model kind: {0}")]
    UnknownCameraModel(u32),

    // --- filesystem ---
    #[error("io error at {path}: {cause}")]
    IoError { path: String, cause: String },
}

impl ReconError {
    pub fn io_error(path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::IoError {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether the scheduler's retry policy should re-attempt the stage that
    /// raised this error (see spec.md §4.10's transient-failure retry set).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconError::StageFailed { .. } | ReconError::IoError { .. }
        )
    }

    /// Whether this error is terminal for the owning job regardless of
    /// retry budget (never retried, ever).
    pub fn is_job_terminal(&self) -> bool {
        matches!(
            self,
            ReconError::UnreadableVideo(_)
                | ReconError::UnsupportedCodec(_)
                | ReconError::FrameExtractionFailed { .. }
                | ReconError::MalformedBinary(_)
                | ReconError::UnknownCameraModel(_)
        )
    }
}
