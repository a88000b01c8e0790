//! Octree spatial index over a `DensePointCloud` (spec.md §4.8).

use recon_models::{BoundingBox, DensePointCloud};

const DEFAULT_LEAF_CAPACITY: usize = 100;
const DEFAULT_MAX_DEPTH: u32 = 8;
const BBOX_EXPANSION_FRACTION: f64 = 0.01;

enum NodeBody {
    Leaf(Vec<usize>),
    Internal(Box<[OctreeNode; 8]>),
}

struct OctreeNode {
    bbox: BoundingBox,
    body: NodeBody,
}

/// An octree over the positions of a `DensePointCloud`, keyed by the
/// cloud's point index (spec.md §4.8).
pub struct Octree {
    root: Option<OctreeNode>,
    positions: Vec<[f64; 3]>,
    leaf_capacity: usize,
    max_depth: u32,
}

impl Octree {
    /// Build an octree over `cloud` (spec.md §4.8 build rule): the bounding
    /// box is expanded by 1%, nodes split at `leaf_capacity` points while
    /// below `max_depth`, and points exactly on a split plane go to the
    /// lower-index child.
    pub fn build(cloud: &DensePointCloud) -> Self {
        Self::build_with(cloud, DEFAULT_LEAF_CAPACITY, DEFAULT_MAX_DEPTH)
    }

    pub fn build_with(cloud: &DensePointCloud, leaf_capacity: usize, max_depth: u32) -> Self {
        let positions: Vec<[f64; 3]> = cloud.points.iter().map(|p| p.position).collect();
        let root = BoundingBox::from_points(positions.iter()).map(|bbox| {
            let bbox = bbox.expand(BBOX_EXPANSION_FRACTION);
            let all_indices: Vec<usize> = (0..positions.len()).collect();
            build_node(&positions, all_indices, bbox, 0, leaf_capacity, max_depth)
        });
        Self { root, positions, leaf_capacity, max_depth }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// All point indices whose positions lie within `radius` of `center`
    /// (spec.md §4.8 `query_sphere`).
    pub fn query_sphere(&self, center: [f64; 3], radius: f64) -> Vec<usize> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            query_sphere_node(root, &self.positions, center, radius, &mut out);
        }
        out.sort_unstable();
        out
    }

    /// The `k` nearest point indices to `point`, ascending by squared
    /// distance with ties broken by ascending index (spec.md §4.8
    /// `nearest`).
    pub fn nearest(&self, point: [f64; 3], k: usize) -> Vec<(usize, f64)> {
        if k == 0 {
            return Vec::new();
        }
        let mut best: Vec<(usize, f64)> = Vec::new();
        if let Some(root) = &self.root {
            nearest_node(root, &self.positions, point, k, &mut best);
        }
        best.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        best.truncate(k);
        best
    }

    /// Pick the point whose perpendicular distance to the ray
    /// `origin + t * direction` is smallest and below `screen_tolerance`,
    /// ties broken by smallest `t` (spec.md §4.8 `ray_pick`).
    pub fn ray_pick(&self, origin: [f64; 3], direction: [f64; 3], screen_tolerance: f64) -> Option<usize> {
        let root = self.root.as_ref()?;
        let dir_norm_sq = dot(direction, direction);
        if dir_norm_sq < 1e-18 {
            return None;
        }

        let mut best: Option<(usize, f64, f64)> = None; // (index, perp_dist, t)
        ray_pick_node(root, &self.positions, origin, direction, dir_norm_sq, screen_tolerance, &mut best);
        best.map(|(idx, _, _)| idx)
    }

    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}

fn build_node(
    positions: &[[f64; 3]],
    indices: Vec<usize>,
    bbox: BoundingBox,
    depth: u32,
    leaf_capacity: usize,
    max_depth: u32,
) -> OctreeNode {
    if indices.len() <= leaf_capacity || depth >= max_depth {
        return OctreeNode { bbox, body: NodeBody::Leaf(indices) };
    }

    let center = bbox.center();
    let mut buckets: [Vec<usize>; 8] = Default::default();
    for idx in indices {
        let octant = octant_of(positions[idx], center);
        buckets[octant].push(idx);
    }

    // If every point landed in one octant, splitting further would loop
    // forever; stop here instead.
    if buckets.iter().filter(|b| !b.is_empty()).count() <= 1 {
        let all: Vec<usize> = buckets.into_iter().flatten().collect();
        return OctreeNode { bbox, body: NodeBody::Leaf(all) };
    }

    let mut children: Vec<OctreeNode> = Vec::with_capacity(8);
    for (octant, bucket) in buckets.into_iter().enumerate() {
        let child_bbox = octant_bbox(&bbox, center, octant);
        children.push(build_node(positions, bucket, child_bbox, depth + 1, leaf_capacity, max_depth));
    }
    let children: Box<[OctreeNode; 8]> = children.try_into().unwrap_or_else(|_| unreachable!());

    OctreeNode { bbox, body: NodeBody::Internal(children) }
}

/// Octant index via per-axis bit: 1 if the coordinate is strictly greater
/// than center (upper half), 0 otherwise — ties go to the lower-index
/// (0-bit) child (spec.md §4.8).
fn octant_of(p: [f64; 3], center: [f64; 3]) -> usize {
    let bx = (p[0] > center[0]) as usize;
    let by = (p[1] > center[1]) as usize;
    let bz = (p[2] > center[2]) as usize;
    bx | (by << 1) | (bz << 2)
}

fn octant_bbox(parent: &BoundingBox, center: [f64; 3], octant: usize) -> BoundingBox {
    let mut min = parent.min;
    let mut max = parent.max;
    for axis in 0..3 {
        let upper = (octant >> axis) & 1 == 1;
        if upper {
            min[axis] = center[axis];
        } else {
            max[axis] = center[axis];
        }
    }
    BoundingBox { min, max }
}

fn query_sphere_node(node: &OctreeNode, positions: &[[f64; 3]], center: [f64; 3], radius: f64, out: &mut Vec<usize>) {
    if !node.bbox.intersects_sphere(&center, radius) {
        return;
    }
    match &node.body {
        NodeBody::Leaf(indices) => {
            let radius_sq = radius * radius;
            for &idx in indices {
                if squared_distance(positions[idx], center) <= radius_sq {
                    out.push(idx);
                }
            }
        }
        NodeBody::Internal(children) => {
            for child in children.iter() {
                query_sphere_node(child, positions, center, radius, out);
            }
        }
    }
}

fn nearest_node(node: &OctreeNode, positions: &[[f64; 3]], point: [f64; 3], k: usize, best: &mut Vec<(usize, f64)>) {
    if best.len() >= k {
        let worst = current_worst(best);
        if node.bbox.squared_distance_to(&point) > worst {
            return;
        }
    }
    match &node.body {
        NodeBody::Leaf(indices) => {
            for &idx in indices {
                let d = squared_distance(positions[idx], point);
                if best.len() < k {
                    best.push((idx, d));
                } else {
                    let worst = current_worst(best);
                    if d < worst {
                        replace_worst(best, idx, d);
                    }
                }
            }
        }
        NodeBody::Internal(children) => {
            for child in children.iter() {
                nearest_node(child, positions, point, k, best);
            }
        }
    }
}

fn current_worst(best: &[(usize, f64)]) -> f64 {
    best.iter().map(|(_, d)| *d).fold(f64::NEG_INFINITY, f64::max)
}

fn replace_worst(best: &mut Vec<(usize, f64)>, idx: usize, d: f64) {
    if let Some(pos) = best
        .iter()
        .enumerate()
        .max_by(|a, b| a.1 .1.partial_cmp(&b.1 .1).unwrap())
        .map(|(i, _)| i)
    {
        best[pos] = (idx, d);
    }
}

#[allow(clippy::too_many_arguments)]
fn ray_pick_node(
    node: &OctreeNode,
    positions: &[[f64; 3]],
    origin: [f64; 3],
    direction: [f64; 3],
    dir_norm_sq: f64,
    screen_tolerance: f64,
    best: &mut Option<(usize, f64, f64)>,
) {
    if !ray_intersects_bbox(&node.bbox, origin, direction) {
        return;
    }
    match &node.body {
        NodeBody::Leaf(indices) => {
            for &idx in indices {
                let p = positions[idx];
                let to_point = sub(p, origin);
                let t = dot(to_point, direction) / dir_norm_sq;
                if t < 0.0 {
                    continue;
                }
                let closest_on_ray = add(origin, scale(direction, t));
                let perp = squared_distance(p, closest_on_ray).sqrt();
                if perp >= screen_tolerance {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((_, best_perp, best_t)) => perp < *best_perp || (perp == *best_perp && t < *best_t),
                };
                if better {
                    *best = Some((idx, perp, t));
                }
            }
        }
        NodeBody::Internal(children) => {
            for child in children.iter() {
                ray_pick_node(child, positions, origin, direction, dir_norm_sq, screen_tolerance, best);
            }
        }
    }
}

fn ray_intersects_bbox(bbox: &BoundingBox, origin: [f64; 3], direction: [f64; 3]) -> bool {
    let mut t_min = f64::NEG_INFINITY;
    let mut t_max = f64::INFINITY;
    for axis in 0..3 {
        if direction[axis].abs() < 1e-15 {
            if origin[axis] < bbox.min[axis] || origin[axis] > bbox.max[axis] {
                return false;
            }
            continue;
        }
        let inv_d = 1.0 / direction[axis];
        let mut t0 = (bbox.min[axis] - origin[axis]) * inv_d;
        let mut t1 = (bbox.max[axis] - origin[axis]) * inv_d;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return false;
        }
    }
    true
}

fn squared_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    (0..3).map(|axis| (a[axis] - b[axis]).powi(2)).sum()
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    std::array::from_fn(|i| a[i] - b[i])
}

fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    std::array::from_fn(|i| a[i] + b[i])
}

fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    std::array::from_fn(|i| a[i] * s)
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    (0..3).map(|i| a[i] * b[i]).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_models::PointRecord;

    fn grid_cloud(n: u32) -> DensePointCloud {
        let mut points = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    points.push(PointRecord { position: [x as f64, y as f64, z as f64], color: None, normal: None });
                }
            }
        }
        DensePointCloud::new(points)
    }

    fn brute_force_sphere(cloud: &DensePointCloud, center: [f64; 3], radius: f64) -> Vec<usize> {
        let radius_sq = radius * radius;
        let mut out: Vec<usize> = cloud
            .points
            .iter()
            .enumerate()
            .filter(|(_, p)| squared_distance(p.position, center) <= radius_sq)
            .map(|(i, _)| i)
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn sphere_query_matches_brute_force() {
        let cloud = grid_cloud(10);
        let tree = Octree::build(&cloud);
        let center = [4.5, 4.5, 4.5];
        let radius = 3.0;
        assert_eq!(tree.query_sphere(center, radius), brute_force_sphere(&cloud, center, radius));
    }

    #[test]
    fn nearest_matches_brute_force_ordering() {
        let cloud = grid_cloud(6);
        let tree = Octree::build(&cloud);
        let point = [2.1, 2.9, 3.0];

        let mut brute: Vec<(usize, f64)> =
            cloud.points.iter().enumerate().map(|(i, p)| (i, squared_distance(p.position, point))).collect();
        brute.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        brute.truncate(5);

        assert_eq!(tree.nearest(point, 5), brute);
    }

    #[test]
    fn empty_cloud_queries_return_empty() {
        let cloud = DensePointCloud::new(vec![]);
        let tree = Octree::build(&cloud);
        assert!(tree.is_empty());
        assert!(tree.query_sphere([0.0, 0.0, 0.0], 1.0).is_empty());
        assert!(tree.nearest([0.0, 0.0, 0.0], 5).is_empty());
        assert_eq!(tree.ray_pick([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 0.1), None);
    }

    #[test]
    fn ray_pick_finds_point_on_axis() {
        let cloud = DensePointCloud::new(vec![
            PointRecord { position: [5.0, 0.0, 0.0], color: None, normal: None },
            PointRecord { position: [3.0, 0.01, 0.0], color: None, normal: None },
        ]);
        let tree = Octree::build(&cloud);
        let picked = tree.ray_pick([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 0.5);
        assert_eq!(picked, Some(0));
    }

    #[test]
    fn ray_pick_ignores_points_behind_the_origin() {
        let cloud = DensePointCloud::new(vec![PointRecord { position: [-5.0, 0.0, 0.0], color: None, normal: None }]);
        let tree = Octree::build(&cloud);
        let picked = tree.ray_pick([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 0.5);
        assert_eq!(picked, None);
    }
}
