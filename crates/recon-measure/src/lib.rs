//! Measurement calibration service (spec.md §4.9).
//!
//! A `Calibrator` holds at most one active `Calibration` at a time, derived
//! from two picked scene points, a known real-world reference distance, and
//! the unit that distance is given in. Measurements are taken against
//! whatever calibration is currently active; deriving a new one atomically
//! replaces the old.

use std::sync::Mutex;

use recon_models::calibration::{Calibration, DistanceUnit, Measurement};
use recon_models::error::ReconResult;
use tracing::info;

#[derive(Default)]
pub struct Calibrator {
    active: Mutex<Option<Calibration>>,
}

impl Calibrator {
    pub fn new() -> Self {
        Self { active: Mutex::new(None) }
    }

    /// Derive a calibration from two scene points and a known real-world
    /// distance given in `unit`, and make it the active calibration.
    /// Replaces any prior calibration atomically; in-flight measurements
    /// against the old one are unaffected since `Measurement` captures its
    /// own scale factor.
    pub fn calibrate(&self, point_a: [f64; 3], point_b: [f64; 3], reference_distance: f64, unit: DistanceUnit) -> ReconResult<Calibration> {
        let calibration = Calibration::derive(point_a, point_b, reference_distance, unit)?;
        *self.active.lock().expect("calibrator mutex poisoned") = Some(calibration);
        info!(scale_factor = calibration.scale_factor, unit = unit.as_str(), "updated active calibration");
        Ok(calibration)
    }

    /// Measure the distance between two scene points. Always returns the
    /// raw reconstruction-space distance and its scaled real-world value;
    /// when no calibration is active, `scaled` equals `raw` and `unit` is
    /// the uncalibrated sentinel (spec.md §4.9).
    pub fn measure(&self, point_a: [f64; 3], point_b: [f64; 3]) -> Measurement {
        let guard = self.active.lock().expect("calibrator mutex poisoned");
        match guard.as_ref() {
            Some(calibration) => Measurement::calibrated(calibration, point_a, point_b),
            None => Measurement::uncalibrated(point_a, point_b),
        }
    }

    /// Drop the active calibration. Subsequent `measure` calls return
    /// uncalibrated measurements until `calibrate` is called again.
    pub fn clear(&self) {
        *self.active.lock().expect("calibrator mutex poisoned") = None;
    }

    pub fn active_calibration(&self) -> Option<Calibration> {
        *self.active.lock().expect("calibrator mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_models::calibration::UNCALIBRATED_UNIT;
    use recon_models::error::ReconError;

    #[test]
    fn measure_before_calibration_returns_raw_distance_with_sentinel_unit() {
        let calibrator = Calibrator::new();
        let measurement = calibrator.measure([0.0; 3], [1.0, 0.0, 0.0]);
        assert!((measurement.raw - 1.0).abs() < 1e-9);
        assert!((measurement.scaled - 1.0).abs() < 1e-9);
        assert_eq!(measurement.unit, UNCALIBRATED_UNIT);
    }

    #[test]
    fn calibrate_then_measure_scales_distance() {
        let calibrator = Calibrator::new();
        calibrator.calibrate([0.0, 0.0, 0.0], [2.0, 0.0, 0.0], 1.0, DistanceUnit::M).unwrap();

        let measurement = calibrator.measure([0.0, 0.0, 0.0], [4.0, 0.0, 0.0]);
        assert!((measurement.scaled - 2.0).abs() < 1e-9);
        assert_eq!(measurement.unit, "m");
    }

    #[test]
    fn a_later_calibration_replaces_the_earlier_one() {
        let calibrator = Calibrator::new();
        calibrator.calibrate([0.0, 0.0, 0.0], [2.0, 0.0, 0.0], 1.0, DistanceUnit::M).unwrap();
        calibrator.calibrate([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0, DistanceUnit::Cm).unwrap();

        let measurement = calibrator.measure([0.0, 0.0, 0.0], [4.0, 0.0, 0.0]);
        assert!((measurement.scaled - 4.0).abs() < 1e-9);
        assert_eq!(measurement.unit, "cm");
    }

    #[test]
    fn clear_drops_the_active_calibration() {
        let calibrator = Calibrator::new();
        calibrator.calibrate([0.0, 0.0, 0.0], [2.0, 0.0, 0.0], 1.0, DistanceUnit::M).unwrap();
        calibrator.clear();
        let measurement = calibrator.measure([0.0; 3], [1.0, 0.0, 0.0]);
        assert_eq!(measurement.unit, UNCALIBRATED_UNIT);
    }

    #[test]
    fn degenerate_calibration_is_rejected_and_leaves_prior_active() {
        let calibrator = Calibrator::new();
        calibrator.calibrate([0.0, 0.0, 0.0], [2.0, 0.0, 0.0], 1.0, DistanceUnit::M).unwrap();

        let result = calibrator.calibrate([1.0, 1.0, 1.0], [1.0, 1.0, 1.0], 1.0, DistanceUnit::M);
        assert!(matches!(result, Err(ReconError::DegenerateCalibration)));

        let measurement = calibrator.measure([0.0, 0.0, 0.0], [4.0, 0.0, 0.0]);
        assert!((measurement.scaled - 2.0).abs() < 1e-9);
    }
}
