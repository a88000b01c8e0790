//! Binary codecs for the external toolchain's cameras/images/points3D model
//! files and for ASCII-header/binary-LE PLY point clouds (spec.md §4.2).

pub mod binary;
pub mod ply;

pub use binary::{read_cameras, read_images, read_points3d, write_cameras, write_images, write_points3d, FormatResult};
pub use ply::{read_ply, write_ply};
