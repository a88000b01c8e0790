//! Octree spatial index over a reconstructed point cloud (spec.md §4.8).

pub mod octree;

pub use octree::Octree;
