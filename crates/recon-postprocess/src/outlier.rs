//! Statistical outlier removal (spec.md §4.7).

use recon_models::DensePointCloud;
use recon_spatial::Octree;

const DEFAULT_K: usize = 20;

/// Drop points whose mean distance to their `k` nearest neighbors exceeds
/// `global_mean + sigma * global_stddev` (spec.md §4.7). Returns a new
/// cloud; the input is untouched.
pub fn remove_statistical_outliers(cloud: &DensePointCloud, sigma: f64) -> DensePointCloud {
    remove_statistical_outliers_k(cloud, DEFAULT_K, sigma)
}

pub fn remove_statistical_outliers_k(cloud: &DensePointCloud, k: usize, sigma: f64) -> DensePointCloud {
    if cloud.points.len() <= k {
        return cloud.clone();
    }

    let tree = Octree::build(cloud);
    let mean_distances: Vec<f64> = cloud
        .points
        .iter()
        .enumerate()
        .map(|(idx, point)| mean_neighbor_distance(&tree, cloud, idx, point.position, k))
        .collect();

    let global_mean = mean_distances.iter().sum::<f64>() / mean_distances.len() as f64;
    let variance = mean_distances.iter().map(|d| (d - global_mean).powi(2)).sum::<f64>() / mean_distances.len() as f64;
    let global_stddev = variance.sqrt();
    let threshold = global_mean + sigma * global_stddev;

    let kept: Vec<_> = cloud
        .points
        .iter()
        .zip(mean_distances.iter())
        .filter(|(_, &d)| d <= threshold)
        .map(|(p, _)| *p)
        .collect();

    DensePointCloud::new(kept)
}

fn mean_neighbor_distance(tree: &Octree, cloud: &DensePointCloud, self_index: usize, position: [f64; 3], k: usize) -> f64 {
    let neighbors = tree.nearest(position, k + 1);
    let mut total = 0.0;
    let mut count = 0usize;
    for (idx, squared_distance) in neighbors {
        if idx == self_index {
            continue;
        }
        let _ = cloud;
        total += squared_distance.sqrt();
        count += 1;
        if count == k {
            break;
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_models::PointRecord;

    #[test]
    fn drops_a_single_far_outlier() {
        let mut points: Vec<PointRecord> = (0..30)
            .map(|i| PointRecord { position: [i as f64 * 0.1, 0.0, 0.0], color: None, normal: None })
            .collect();
        points.push(PointRecord { position: [1000.0, 1000.0, 1000.0], color: None, normal: None });

        let cloud = DensePointCloud::new(points);
        let cleaned = remove_statistical_outliers_k(&cloud, 5, 2.0);
        assert!(cleaned.len() < cloud.len());
        assert!(cleaned.points.iter().all(|p| p.position[0] < 1000.0));
    }
}
