//! Measurement calibration (spec.md §3, §4.9 Calibrator).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, ReconResult};

/// A real-world distance unit a calibration's reference distance is given
/// in (spec.md §3: "a unit ('m' / 'cm' / 'mm')").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    M,
    Cm,
    Mm,
}

impl DistanceUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceUnit::M => "m",
            DistanceUnit::Cm => "cm",
            DistanceUnit::Mm => "mm",
        }
    }

    pub fn parse(s: &str) -> ReconResult<Self> {
        match s {
            "m" => Ok(DistanceUnit::M),
            "cm" => Ok(DistanceUnit::Cm),
            "mm" => Ok(DistanceUnit::Mm),
            other => Err(ReconError::InvalidReference(format!("unknown distance unit: {other}"))),
        }
    }
}

/// A scale factor derived from two picked points and a known real-world
/// distance between them (spec.md §3 Calibration, §4.9). Immutable once
/// produced; a new calibration replaces the old one atomically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub point_a: [f64; 3],
    pub point_b: [f64; 3],
    pub reference_distance: f64,
    pub unit: DistanceUnit,
    /// `unit`-per-scene-unit multiplier: `reference_distance / |a - b|`.
    pub scale_factor: f64,
    pub created_at: DateTime<Utc>,
}

impl Calibration {
    /// Derive a `Calibration` from two scene-space points and the known
    /// real-world distance between them, in `unit` (spec.md §4.9).
    ///
    /// Returns `InvalidReference` if the reference distance is not a
    /// positive finite number, and `DegenerateCalibration` if the two
    /// points are (numerically) coincident.
    pub fn derive(point_a: [f64; 3], point_b: [f64; 3], reference_distance: f64, unit: DistanceUnit) -> ReconResult<Self> {
        if !reference_distance.is_finite() || reference_distance <= 0.0 {
            return Err(ReconError::InvalidReference(format!(
                "reference distance must be a positive finite number, got {reference_distance}"
            )));
        }

        let scene_distance = euclidean_distance(&point_a, &point_b);
        if scene_distance < 1e-9 {
            return Err(ReconError::DegenerateCalibration);
        }

        Ok(Self {
            point_a,
            point_b,
            reference_distance,
            unit,
            scale_factor: reference_distance / scene_distance,
            created_at: Utc::now(),
        })
    }

    /// Convert a scene-space distance into this calibration's `unit` using
    /// its scale factor.
    pub fn scale(&self, scene_distance: f64) -> f64 {
        scene_distance * self.scale_factor
    }
}

/// A distance measurement between two scene points (spec.md §3 Measurement,
/// §4.9): the raw reconstruction-space distance, its scaled real-world
/// value, and the unit that value is in — `"(uncalibrated)"` when no
/// calibration was active at measurement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub point_a: [f64; 3],
    pub point_b: [f64; 3],
    pub raw: f64,
    pub scaled: f64,
    pub unit: String,
    pub created_at: DateTime<Utc>,
}

/// Sentinel unit string for a measurement taken with no active calibration
/// (spec.md §4.9 `measure`).
pub const UNCALIBRATED_UNIT: &str = "(uncalibrated)";

impl Measurement {
    /// A measurement scaled by an active calibration.
    pub fn calibrated(calibration: &Calibration, point_a: [f64; 3], point_b: [f64; 3]) -> Self {
        let raw = euclidean_distance(&point_a, &point_b);
        Self {
            point_a,
            point_b,
            raw,
            scaled: calibration.scale(raw),
            unit: calibration.unit.as_str().to_string(),
            created_at: Utc::now(),
        }
    }

    /// A measurement with no active calibration: `scaled` equals `raw`,
    /// and `unit` is the uncalibrated sentinel.
    pub fn uncalibrated(point_a: [f64; 3], point_b: [f64; 3]) -> Self {
        let raw = euclidean_distance(&point_a, &point_b);
        Self {
            point_a,
            point_b,
            raw,
            scaled: raw,
            unit: UNCALIBRATED_UNIT.to_string(),
            created_at: Utc::now(),
        }
    }
}

fn euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|axis| (a[axis] - b[axis]).powi(2)).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_rejects_coincident_points() {
        let result = Calibration::derive([0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 1.0, DistanceUnit::M);
        assert!(matches!(result, Err(ReconError::DegenerateCalibration)));
    }

    #[test]
    fn derive_rejects_non_positive_reference_distance() {
        let result = Calibration::derive([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 0.0, DistanceUnit::M);
        assert!(matches!(result, Err(ReconError::InvalidReference(_))));
    }

    #[test]
    fn measurement_scales_by_calibration_factor() {
        let calibration = Calibration::derive([0.0, 0.0, 0.0], [2.0, 0.0, 0.0], 1.0, DistanceUnit::M).unwrap();
        assert!((calibration.scale_factor - 0.5).abs() < 1e-9);

        let measurement = Measurement::calibrated(&calibration, [0.0, 0.0, 0.0], [4.0, 0.0, 0.0]);
        assert!((measurement.scaled - 2.0).abs() < 1e-9);
        assert_eq!(measurement.unit, "m");
    }

    #[test]
    fn uncalibrated_measurement_reports_raw_distance_and_sentinel_unit() {
        let measurement = Measurement::uncalibrated([0.0, 0.0, 0.0], [3.0, 0.0, 0.0]);
        assert!((measurement.raw - 3.0).abs() < 1e-9);
        assert!((measurement.scaled - 3.0).abs() < 1e-9);
        assert_eq!(measurement.unit, UNCALIBRATED_UNIT);
    }

    #[test]
    fn distance_unit_round_trips_through_parse_and_as_str() {
        for unit in [DistanceUnit::M, DistanceUnit::Cm, DistanceUnit::Mm] {
            assert_eq!(DistanceUnit::parse(unit.as_str()).unwrap(), unit);
        }
        assert!(matches!(DistanceUnit::parse("furlong"), Err(ReconError::InvalidReference(_))));
    }
}
