//! Sparse reconstruction and dense point cloud types (spec.md §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;

/// Closed set of intrinsic camera models the external toolchain emits
/// (spec.md §4.2). The associated parameter-vector length is fixed per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum CameraModelKind {
    SimplePinhole = 0,
    Pinhole = 1,
    SimpleRadial = 2,
    Radial = 3,
    OpenCv = 4,
    OpenCvFisheye = 5,
    FullOpenCv = 6,
    Fov = 7,
    SimpleRadialFisheye = 8,
    RadialFisheye = 9,
    ThinPrismFisheye = 10,
}

impl CameraModelKind {
    pub fn from_u32(code: u32) -> Result<Self, ReconError> {
        Ok(match code {
            0 => Self::SimplePinhole,
            1 => Self::Pinhole,
            2 => Self::SimpleRadial,
            3 => Self::Radial,
            4 => Self::OpenCv,
            5 => Self::OpenCvFisheye,
            6 => Self::FullOpenCv,
            7 => Self::Fov,
            8 => Self::SimpleRadialFisheye,
            9 => Self::RadialFisheye,
            10 => Self::ThinPrismFisheye,
            other => return Err(ReconError::UnknownCameraModel(other)),
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Fixed parameter-vector length per model kind (spec.md §4.2).
    pub fn param_count(self) -> usize {
        match self {
            Self::SimplePinhole => 3,
            Self::Pinhole => 4,
            Self::SimpleRadial => 4,
            Self::Radial => 5,
            Self::OpenCv => 8,
            Self::OpenCvFisheye => 8,
            Self::FullOpenCv => 12,
            Self::Fov => 5,
            Self::SimpleRadialFisheye => 4,
            Self::RadialFisheye => 5,
            Self::ThinPrismFisheye => 12,
        }
    }
}

/// Intrinsic camera parameters, shared by any number of images within a
/// reconstruction (spec.md §3 CameraModel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub id: u32,
    pub kind: CameraModelKind,
    pub width: u64,
    pub height: u64,
    pub params: Vec<f64>,
}

/// Either a 3D-point back-reference or "no correspondence" (spec.md §3).
pub type PointRef = Option<u64>;

/// A single 2D observation within an image (spec.md §3 ImagePose).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub x: f64,
    pub y: f64,
    pub point3d_id: PointRef,
}

/// Extrinsic camera pose plus the image's 2D observations (spec.md §3
/// ImagePose). `q*` form a unit quaternion (w, x, y, z).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePose {
    pub id: u32,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub camera_id: u32,
    pub name: String,
    pub observations: Vec<Observation>,
}

/// A single (image id, observation index) track entry (spec.md §3 Point3D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub image_id: u32,
    pub observation_index: u32,
}

/// A triangulated 3D point with RGB color and a non-empty observation
/// track (spec.md §3 Point3D invariant: track length >= 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub reprojection_error: f64,
    pub track: Vec<TrackEntry>,
}

impl Point3D {
    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// A set of cameras, poses, and points with cross-referential integrity
/// (spec.md §3 Reconstruction).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reconstruction {
    pub cameras: Vec<CameraModel>,
    pub images: Vec<ImagePose>,
    pub points: Vec<Point3D>,
}

impl Reconstruction {
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Verify every cross-reference resolves (spec.md §3's Reconstruction
    /// invariant): image -> camera, observation -> point, track -> image.
    pub fn check_integrity(&self) -> Result<(), ReconError> {
        let camera_ids: std::collections::HashSet<u32> = self.cameras.iter().map(|c| c.id).collect();
        let image_ids: std::collections::HashSet<u32> = self.images.iter().map(|i| i.id).collect();
        let point_ids: std::collections::HashSet<u64> = self.points.iter().map(|p| p.id).collect();

        for image in &self.images {
            if !camera_ids.contains(&image.camera_id) {
                return Err(ReconError::MalformedBinary(format!(
                    "image {} references unknown camera {}",
                    image.id, image.camera_id
                )));
            }
            for obs in &image.observations {
                if let Some(point_id) = obs.point3d_id {
                    if !point_ids.contains(&point_id) {
                        return Err(ReconError::MalformedBinary(format!(
                            "image {} observation references unknown point {}",
                            image.id, point_id
                        )));
                    }
                }
            }
        }
        for point in &self.points {
            if point.track.len() < 2 {
                return Err(ReconError::MalformedBinary(format!(
                    "point {} has a track shorter than 2",
                    point.id
                )));
            }
            for entry in &point.track {
                if !image_ids.contains(&entry.image_id) {
                    return Err(ReconError::MalformedBinary(format!(
                        "point {} track references unknown image {}",
                        point.id, entry.image_id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn cameras_by_id(&self) -> HashMap<u32, &CameraModel> {
        self.cameras.iter().map(|c| (c.id, c)).collect()
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl Iterator<Item = &'a [f64; 3]>) -> Option<Self> {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        let mut any = false;
        for p in points {
            any = true;
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        any.then_some(Self { min, max })
    }

    pub fn expand(&self, fraction: f64) -> Self {
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..3 {
            let extent = (max[axis] - min[axis]).max(1e-9);
            let pad = extent * fraction / 2.0;
            min[axis] -= pad;
            max[axis] += pad;
        }
        Self { min, max }
    }

    pub fn contains(&self, p: &[f64; 3]) -> bool {
        (0..3).all(|axis| p[axis] >= self.min[axis] && p[axis] <= self.max[axis])
    }

    pub fn center(&self) -> [f64; 3] {
        std::array::from_fn(|axis| (self.min[axis] + self.max[axis]) / 2.0)
    }

    /// Squared distance from `p` to the nearest point of the box (0 if
    /// `p` is inside), used by the octree's pruning tests.
    pub fn squared_distance_to(&self, p: &[f64; 3]) -> f64 {
        let mut sum = 0.0;
        for axis in 0..3 {
            let d = if p[axis] < self.min[axis] {
                self.min[axis] - p[axis]
            } else if p[axis] > self.max[axis] {
                p[axis] - self.max[axis]
            } else {
                0.0
            };
            sum += d * d;
        }
        sum
    }

    /// Whether the box intersects a sphere of the given center/radius.
    pub fn intersects_sphere(&self, center: &[f64; 3], radius: f64) -> bool {
        self.squared_distance_to(center) <= radius * radius
    }
}

/// One record of a `DensePointCloud` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub position: [f64; 3],
    pub color: Option<[u8; 3]>,
    pub normal: Option<[f64; 3]>,
}

/// An ordered, dense point cloud with no track/camera back-references
/// (spec.md §3 DensePointCloud), distinguishing it from a sparse
/// Reconstruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DensePointCloud {
    pub points: Vec<PointRecord>,
}

impl DensePointCloud {
    pub fn new(points: Vec<PointRecord>) -> Self {
        Self { points }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.points.iter().map(|p| &p.position))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<&Reconstruction> for DensePointCloud {
    fn from(recon: &Reconstruction) -> Self {
        let points = recon
            .points
            .iter()
            .map(|p| PointRecord {
                position: p.position(),
                color: Some([p.r, p.g, p.b]),
                normal: None,
            })
            .collect();
        Self { points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_expand_grows_symmetrically() {
        let bbox = BoundingBox { min: [0.0; 3], max: [10.0; 3] };
        let expanded = bbox.expand(0.1);
        assert!(expanded.min[0] < 0.0);
        assert!(expanded.max[0] > 10.0);
    }

    #[test]
    fn integrity_check_rejects_short_tracks() {
        let recon = Reconstruction {
            cameras: vec![CameraModel { id: 0, kind: CameraModelKind::Pinhole, width: 100, height: 100, params: vec![1.0; 4] }],
            images: vec![ImagePose {
                id: 0,
                qw: 1.0, qx: 0.0, qy: 0.0, qz: 0.0,
                tx: 0.0, ty: 0.0, tz: 0.0,
                camera_id: 0,
                name: "a.jpg".into(),
                observations: vec![],
            }],
            points: vec![Point3D {
                id: 0, x: 0.0, y: 0.0, z: 0.0, r: 0, g: 0, b: 0,
                reprojection_error: 0.1,
                track: vec![TrackEntry { image_id: 0, observation_index: 0 }],
            }],
        };
        assert!(recon.check_integrity().is_err());
    }
}
