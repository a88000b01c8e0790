//! External photogrammetry toolchain driver (spec.md §4.6): FEATURES,
//! MATCHES, SPARSE, DENSE as black-box subprocesses.

pub mod args;
pub mod driver;
pub mod progress;

pub use args::{build_command, StageCommand};
pub use driver::{run_stage, run_stage_cancellable};
pub use progress::{default_patterns, extract_progress, ProgressPattern};
