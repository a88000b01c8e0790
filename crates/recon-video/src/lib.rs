//! Video container analysis (C4) and frame extraction (C5) — spec.md §4.4,
//! §4.5.

pub mod extract;
pub mod probe;
pub mod reproject;

pub use extract::{extract_frames, ExtractionPlan};
pub use probe::probe_video;
pub use reproject::{reproject_pinhole, FIELD_OF_VIEW_DEG, YAW_ANGLES_DEG};
