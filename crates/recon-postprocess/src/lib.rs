//! Dense point-cloud post-processing: outlier removal, voxel downsampling,
//! normal estimation, and colormap assignment (spec.md §4.7).
//!
//! Every operation here takes a `DensePointCloud` by reference and returns
//! a new one; none mutate their input.

pub mod colormap;
pub mod normals;
pub mod outlier;
pub mod voxel;

pub use colormap::{assign_colormap, Colormap};
pub use normals::{estimate_normals, estimate_normals_k};
pub use outlier::{remove_statistical_outliers, remove_statistical_outliers_k};
pub use voxel::voxel_downsample;
