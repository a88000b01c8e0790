//! Shared data model and error taxonomy for the reconstruction pipeline.

pub mod calibration;
pub mod error;
pub mod job;
pub mod params;
pub mod recon;
pub mod stage;
pub mod video;

pub use calibration::{Calibration, DistanceUnit, Measurement, UNCALIBRATED_UNIT};
pub use error::{ReconError, ReconResult};
pub use job::{Job, JobId, JobState};
pub use params::{base_table, MatcherKind, OutputFormat, ParameterRecord, QualityTag};
pub use recon::{
    BoundingBox, CameraModel, CameraModelKind, DensePointCloud, ImagePose, Observation, Point3D,
    PointRecord, Reconstruction, TrackEntry,
};
pub use stage::{StageExecution, StageGraph, StageKind, StageStatus};
pub use video::{Colorspace, VideoMetadata};
