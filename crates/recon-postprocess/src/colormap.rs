//! Scalar-field colormap assignment (spec.md §4.7).

use recon_models::{DensePointCloud, PointRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Jet,
    Viridis,
    Hot,
    Plasma,
}

/// Color every point by a scalar derived from it (e.g. height, or a
/// reprojection error carried alongside the cloud), min-max normalized
/// across the whole cloud before the colormap is applied.
pub fn assign_colormap(
    cloud: &DensePointCloud,
    scalar_of: impl Fn(&PointRecord) -> f64,
    scheme: Colormap,
) -> DensePointCloud {
    if cloud.is_empty() {
        return cloud.clone();
    }

    let scalars: Vec<f64> = cloud.points.iter().map(&scalar_of).collect();
    let min = scalars.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scalars.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    let points = cloud
        .points
        .iter()
        .zip(scalars.iter())
        .map(|(point, &value)| {
            let t = if range > 1e-12 { ((value - min) / range).clamp(0.0, 1.0) } else { 0.0 };
            PointRecord { color: Some(sample(scheme, t)), ..*point }
        })
        .collect();

    DensePointCloud::new(points)
}

fn sample(scheme: Colormap, t: f64) -> [u8; 3] {
    match scheme {
        Colormap::Jet => jet(t),
        Colormap::Viridis => viridis(t),
        Colormap::Hot => hot(t),
        Colormap::Plasma => plasma(t),
    }
}

fn to_u8(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn jet(t: f64) -> [u8; 3] {
    let r = (1.5 - (4.0 * t - 3.0).abs()).clamp(0.0, 1.0);
    let g = (1.5 - (4.0 * t - 2.0).abs()).clamp(0.0, 1.0);
    let b = (1.5 - (4.0 * t - 1.0).abs()).clamp(0.0, 1.0);
    [to_u8(r), to_u8(g), to_u8(b)]
}

fn hot(t: f64) -> [u8; 3] {
    let r = (3.0 * t).clamp(0.0, 1.0);
    let g = (3.0 * t - 1.0).clamp(0.0, 1.0);
    let b = (3.0 * t - 2.0).clamp(0.0, 1.0);
    [to_u8(r), to_u8(g), to_u8(b)]
}

/// Piecewise-linear stand-ins for the perceptually-uniform matplotlib
/// colormaps, interpolated between a handful of published control points.
fn viridis(t: f64) -> [u8; 3] {
    const STOPS: [[f64; 3]; 5] = [
        [0.267, 0.005, 0.329],
        [0.283, 0.141, 0.458],
        [0.254, 0.265, 0.530],
        [0.207, 0.372, 0.553],
        [0.993, 0.906, 0.144],
    ];
    interpolate_stops(&STOPS, t)
}

fn plasma(t: f64) -> [u8; 3] {
    const STOPS: [[f64; 3]; 5] = [
        [0.050, 0.030, 0.528],
        [0.494, 0.012, 0.658],
        [0.798, 0.280, 0.469],
        [0.973, 0.585, 0.254],
        [0.940, 0.975, 0.131],
    ];
    interpolate_stops(&STOPS, t)
}

fn interpolate_stops(stops: &[[f64; 3]], t: f64) -> [u8; 3] {
    let segments = stops.len() - 1;
    let scaled = t.clamp(0.0, 1.0) * segments as f64;
    let index = (scaled.floor() as usize).min(segments - 1);
    let local_t = scaled - index as f64;
    let a = stops[index];
    let b = stops[index + 1];
    [
        to_u8(a[0] + (b[0] - a[0]) * local_t),
        to_u8(a[1] + (b[1] - a[1]) * local_t),
        to_u8(a[2] + (b[2] - a[2]) * local_t),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_before_mapping() {
        let cloud = DensePointCloud::new(vec![
            PointRecord { position: [0.0, 0.0, 0.0], color: None, normal: None },
            PointRecord { position: [0.0, 0.0, 10.0], color: None, normal: None },
        ]);
        let colored = assign_colormap(&cloud, |p| p.position[2], Colormap::Jet);
        assert_eq!(colored.points[0].color, Some(jet(0.0)));
        assert_eq!(colored.points[1].color, Some(jet(1.0)));
    }

    #[test]
    fn constant_scalar_maps_to_lower_bound() {
        let cloud = DensePointCloud::new(vec![
            PointRecord { position: [1.0, 1.0, 1.0], color: None, normal: None },
            PointRecord { position: [2.0, 2.0, 2.0], color: None, normal: None },
        ]);
        let colored = assign_colormap(&cloud, |_| 5.0, Colormap::Viridis);
        assert_eq!(colored.points[0].color, colored.points[1].color);
    }
}
