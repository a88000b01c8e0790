//! Normal estimation by local plane fitting (spec.md §4.7).

use recon_models::{DensePointCloud, PointRecord};
use recon_spatial::Octree;
use rayon::prelude::*;

const DEFAULT_K: usize = 20;

/// Estimate a normal for every point from its `k` nearest neighbors via a
/// least-squares plane fit (smallest-eigenvalue eigenvector of the
/// neighborhood covariance matrix), oriented to face `viewpoint`.
pub fn estimate_normals(cloud: &DensePointCloud, viewpoint: [f64; 3]) -> DensePointCloud {
    estimate_normals_k(cloud, DEFAULT_K, viewpoint)
}

pub fn estimate_normals_k(cloud: &DensePointCloud, k: usize, viewpoint: [f64; 3]) -> DensePointCloud {
    if cloud.points.len() <= 3 {
        return cloud.clone();
    }

    let tree = Octree::build(cloud);
    let points: Vec<PointRecord> = cloud
        .points
        .par_iter()
        .map(|point| {
            let neighbors = tree.nearest(point.position, k);
            let neighbor_positions: Vec<[f64; 3]> = neighbors
                .iter()
                .map(|(idx, _)| cloud.points[*idx].position)
                .collect();
            let normal = plane_normal(&neighbor_positions, point.position, viewpoint);
            PointRecord { normal, ..*point }
        })
        .collect();

    DensePointCloud::new(points)
}

fn plane_normal(neighbors: &[[f64; 3]], at: [f64; 3], viewpoint: [f64; 3]) -> Option<[f64; 3]> {
    if neighbors.len() < 3 {
        return None;
    }

    let n = neighbors.len() as f64;
    let mut centroid = [0.0; 3];
    for p in neighbors {
        for axis in 0..3 {
            centroid[axis] += p[axis];
        }
    }
    for axis in 0..3 {
        centroid[axis] /= n;
    }

    let mut covariance = [[0.0; 3]; 3];
    for p in neighbors {
        let d = [p[0] - centroid[0], p[1] - centroid[1], p[2] - centroid[2]];
        for i in 0..3 {
            for j in 0..3 {
                covariance[i][j] += d[i] * d[j];
            }
        }
    }

    let mut normal = smallest_eigenvector(covariance)?;
    let to_viewpoint = [viewpoint[0] - at[0], viewpoint[1] - at[1], viewpoint[2] - at[2]];
    if dot(normal, to_viewpoint) < 0.0 {
        normal = [-normal[0], -normal[1], -normal[2]];
    }
    Some(normal)
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Eigenvector for the smallest eigenvalue of a symmetric 3x3 matrix,
/// found by the cyclic Jacobi rotation method.
fn smallest_eigenvector(matrix: [[f64; 3]; 3]) -> Option<[f64; 3]> {
    let mut a = matrix;
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    for _ in 0..50 {
        let (p, q, off_diag_magnitude) = largest_off_diagonal(&a);
        if off_diag_magnitude < 1e-12 {
            break;
        }
        jacobi_rotate(&mut a, &mut v, p, q);
    }

    let eigenvalues = [a[0][0], a[1][1], a[2][2]];
    let mut smallest = 0;
    for i in 1..3 {
        if eigenvalues[i].abs() < eigenvalues[smallest].abs() {
            smallest = i;
        }
    }

    let vector = [v[0][smallest], v[1][smallest], v[2][smallest]];
    let magnitude = (vector[0].powi(2) + vector[1].powi(2) + vector[2].powi(2)).sqrt();
    if magnitude < 1e-12 {
        None
    } else {
        Some([vector[0] / magnitude, vector[1] / magnitude, vector[2] / magnitude])
    }
}

fn largest_off_diagonal(a: &[[f64; 3]; 3]) -> (usize, usize, f64) {
    let candidates = [(0, 1), (0, 2), (1, 2)];
    let mut best = candidates[0];
    let mut best_value = a[0][1].abs();
    for &(p, q) in &candidates[1..] {
        if a[p][q].abs() > best_value {
            best_value = a[p][q].abs();
            best = (p, q);
        }
    }
    (best.0, best.1, best_value)
}

fn jacobi_rotate(a: &mut [[f64; 3]; 3], v: &mut [[f64; 3]; 3], p: usize, q: usize) {
    if a[p][q].abs() < 1e-300 {
        return;
    }
    let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
    let c = 1.0 / (t * t + 1.0).sqrt();
    let s = t * c;

    let app = a[p][p];
    let aqq = a[q][q];
    let apq = a[p][q];

    a[p][p] = app - t * apq;
    a[q][q] = aqq + t * apq;
    a[p][q] = 0.0;
    a[q][p] = 0.0;

    for i in 0..3 {
        if i != p && i != q {
            let aip = a[i][p];
            let aiq = a[i][q];
            a[i][p] = c * aip - s * aiq;
            a[p][i] = a[i][p];
            a[i][q] = s * aip + c * aiq;
            a[q][i] = a[i][q];
        }
        let vip = v[i][p];
        let viq = v[i][q];
        v[i][p] = c * vip - s * viq;
        v[i][q] = s * vip + c * viq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_xy_plane_gets_z_normal() {
        let mut points = Vec::new();
        for x in 0..8 {
            for y in 0..8 {
                points.push(PointRecord { position: [x as f64 * 0.1, y as f64 * 0.1, 0.0], color: None, normal: None });
            }
        }
        let cloud = DensePointCloud::new(points);
        let estimated = estimate_normals_k(&cloud, 10, [0.0, 0.0, 10.0]);
        for point in &estimated.points {
            let normal = point.normal.expect("plane fit should produce a normal");
            assert!(normal[2].abs() > 0.9, "expected near-vertical normal, got {normal:?}");
            assert!(normal[2] > 0.0, "normal should face the viewpoint above the plane");
        }
    }
}
