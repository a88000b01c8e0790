//! Voxel-grid downsampling (spec.md §4.7).

use std::collections::HashMap;

use recon_models::{DensePointCloud, PointRecord};

/// Collapse points into `voxel_size`-edge cubes, one output point per
/// non-empty voxel: mean position, channel-wise mean color (rounded), and
/// normalized mean normal when every contributing point carries one.
///
/// Voxels are emitted in the order their first member was seen in `cloud`,
/// so repeated runs over the same input are byte-for-byte identical.
pub fn voxel_downsample(cloud: &DensePointCloud, voxel_size: f64) -> DensePointCloud {
    if cloud.is_empty() || voxel_size <= 0.0 {
        return cloud.clone();
    }

    let bbox = cloud
        .bounding_box()
        .expect("non-empty cloud has a bounding box");

    let mut order: Vec<[i64; 3]> = Vec::new();
    let mut buckets: HashMap<[i64; 3], Vec<usize>> = HashMap::new();

    for (idx, point) in cloud.points.iter().enumerate() {
        let key = voxel_key(point.position, bbox.min, voxel_size);
        buckets.entry(key).or_insert_with(|| {
            order.push(key);
            Vec::new()
        }).push(idx);
    }

    let downsampled = order
        .into_iter()
        .map(|key| merge_voxel(cloud, &buckets[&key]))
        .collect();

    DensePointCloud::new(downsampled)
}

fn voxel_key(position: [f64; 3], origin: [f64; 3], voxel_size: f64) -> [i64; 3] {
    [
        ((position[0] - origin[0]) / voxel_size).floor() as i64,
        ((position[1] - origin[1]) / voxel_size).floor() as i64,
        ((position[2] - origin[2]) / voxel_size).floor() as i64,
    ]
}

fn merge_voxel(cloud: &DensePointCloud, indices: &[usize]) -> PointRecord {
    let n = indices.len() as f64;
    let mut position = [0.0; 3];
    let mut color_sum = [0u32; 3];
    let mut color_count = 0usize;
    let mut normal_sum = [0.0; 3];
    let mut normal_count = 0usize;

    for &idx in indices {
        let point = &cloud.points[idx];
        for axis in 0..3 {
            position[axis] += point.position[axis];
        }
        if let Some(color) = point.color {
            for channel in 0..3 {
                color_sum[channel] += color[channel] as u32;
            }
            color_count += 1;
        }
        if let Some(normal) = point.normal {
            for axis in 0..3 {
                normal_sum[axis] += normal[axis];
            }
            normal_count += 1;
        }
    }

    for axis in 0..3 {
        position[axis] /= n;
    }

    let color = if color_count == indices.len() {
        Some([
            (color_sum[0] as f64 / n).round() as u8,
            (color_sum[1] as f64 / n).round() as u8,
            (color_sum[2] as f64 / n).round() as u8,
        ])
    } else {
        None
    };

    let normal = if normal_count == indices.len() {
        let magnitude = (normal_sum[0].powi(2) + normal_sum[1].powi(2) + normal_sum[2].powi(2)).sqrt();
        if magnitude > 1e-12 {
            Some([normal_sum[0] / magnitude, normal_sum[1] / magnitude, normal_sum[2] / magnitude])
        } else {
            None
        }
    } else {
        None
    };

    PointRecord { position, color, normal }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_coincident_points_into_one_voxel() {
        let cloud = DensePointCloud::new(vec![
            PointRecord { position: [0.1, 0.1, 0.1], color: Some([10, 20, 30]), normal: None },
            PointRecord { position: [0.2, 0.2, 0.2], color: Some([20, 30, 40]), normal: None },
            PointRecord { position: [5.0, 5.0, 5.0], color: Some([0, 0, 0]), normal: None },
        ]);

        let downsampled = voxel_downsample(&cloud, 1.0);
        assert_eq!(downsampled.len(), 2);
        let merged = downsampled.points[0];
        assert!((merged.position[0] - 0.15).abs() < 1e-9);
        assert_eq!(merged.color, Some([15, 25, 35]));
    }

    #[test]
    fn is_deterministic_across_repeated_runs() {
        let cloud = DensePointCloud::new(vec![
            PointRecord { position: [0.0, 0.0, 0.0], color: None, normal: None },
            PointRecord { position: [0.05, 0.0, 0.0], color: None, normal: None },
            PointRecord { position: [10.0, 0.0, 0.0], color: None, normal: None },
        ]);
        let a = voxel_downsample(&cloud, 0.5);
        let b = voxel_downsample(&cloud, 0.5);
        assert_eq!(a.points, b.points);
    }
}
