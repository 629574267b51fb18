//! Heel and magnetic heading from the IMU's rotation vector and magnetometer.

use nalgebra::{Rotation3, UnitQuaternion, Vector3};

use crate::calibration::CalibrationState;
use crate::config::NavConfig;
use crate::error::{NavError, NavResult};
use crate::geodesy::normalize_degrees;
use crate::types::{MagData, Quaternion};

/// Roll and pitch of one quaternion, degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
}

impl Attitude {
    pub fn from_quaternion(q: &Quaternion) -> Self {
        let unit = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(q.real, q.i, q.j, q.k));
        let (roll, pitch, _yaw) = unit.euler_angles();
        Self { roll: roll.to_degrees(), pitch: pitch.to_degrees() }
    }

    /// Rotation taking body-frame vectors back to the level frame.
    pub fn leveling(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(self.roll.to_radians(), self.pitch.to_radians(), 0.0)
    }
}

fn mag_vector(mag: &MagData) -> Vector3<f64> {
    Vector3::new(mag.x, mag.y, mag.z)
}

/// What happened to one magnetometer sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MagStatus {
    Accepted,
    /// Field too weak to be a real reading
    TooWeak,
    /// Same vector as the last accepted sample
    Unchanged,
    /// Unchanged for longer than the stale window. Reported once per stall.
    Stale,
}

/// Heading in degrees from a magnetometer vector, tilt-compensated when the
/// boat is heeled or pitched past `min_tilt_deg`.
pub fn magnetic_heading(mag: &MagData, attitude: Option<Attitude>, min_tilt_deg: f64) -> f64 {
    let body = mag_vector(mag);
    let level = match attitude {
        Some(att) if att.roll.abs() > min_tilt_deg || att.pitch.abs() > min_tilt_deg => att.leveling() * body,
        _ => body,
    };
    normalize_degrees(level.y.atan2(level.x).to_degrees())
}

pub struct OrientationEngine {
    config: NavConfig,
    calibration: CalibrationState,

    attitude: Option<Attitude>,

    raw_heading: Option<f64>,
    smoothed_heading: Option<f64>,

    // Magnetometer freshness
    last_mag: Option<MagData>,
    last_mag_change: Option<f64>,
    stale_reported: bool,
}

impl OrientationEngine {
    pub fn new(config: &NavConfig, calibration: CalibrationState) -> Self {
        Self {
            config: config.clone(),
            calibration,
            attitude: None,
            raw_heading: None,
            smoothed_heading: None,
            last_mag: None,
            last_mag_change: None,
            stale_reported: false,
        }
    }

    pub fn calibration(&self) -> CalibrationState {
        self.calibration
    }

    pub fn set_calibration(&mut self, calibration: CalibrationState) {
        self.calibration = calibration;
    }

    pub fn update_attitude(&mut self, q: &Quaternion) -> Attitude {
        let attitude = Attitude::from_quaternion(q);
        self.attitude = Some(attitude);
        attitude
    }

    pub fn update_heading(&mut self, mag: &MagData, now: f64) -> MagStatus {
        let field = mag_vector(mag);
        if !(field.norm() > self.config.mag_min_field) {
            return MagStatus::TooWeak;
        }

        let changed = match &self.last_mag {
            None => true,
            Some(prev) => (field - mag_vector(prev)).amax() > self.config.mag_change_epsilon,
        };

        if !changed {
            let since = self.last_mag_change.map_or(0.0, |t| now - t);
            if since > self.config.mag_stale_warn_secs && !self.stale_reported {
                log::warn!("Magnetometer unchanged for {:.1}s, heading frozen", since);
                self.stale_reported = true;
                return MagStatus::Stale;
            }
            return MagStatus::Unchanged;
        }

        self.last_mag = Some(*mag);
        self.last_mag_change = Some(now);
        self.stale_reported = false;

        let raw = magnetic_heading(mag, self.attitude, self.config.tilt_compensation_min_deg);
        self.raw_heading = Some(raw);
        self.smoothed_heading = Some(match self.smoothed_heading {
            None => raw,
            Some(prev) => smooth_heading(prev, raw, self.config.heading_smoothing_alpha),
        });
        MagStatus::Accepted
    }

    pub fn attitude(&self) -> Option<Attitude> {
        self.attitude
    }

    /// Uncalibrated roll, degrees.
    pub fn raw_roll(&self) -> Option<f64> {
        self.attitude.map(|a| a.roll)
    }

    /// Calibrated heel, degrees. Negative is port.
    pub fn heel(&self) -> Option<f64> {
        self.raw_roll().map(|roll| roll - self.calibration.heel_angle_delta)
    }

    pub fn raw_heading(&self) -> Option<f64> {
        self.raw_heading
    }

    pub fn smoothed_heading(&self) -> Option<f64> {
        self.smoothed_heading
    }

    /// Calibrated magnetic heading with the smoothed value in [0, 360).
    pub fn heading(&self) -> Option<f64> {
        self.smoothed_heading
            .map(|h| normalize_degrees(h - self.calibration.compass_offset_delta))
    }

    /// Heading as displayed, whole degrees 0..=359.
    pub fn hdm(&self) -> Option<u16> {
        self.heading().map(|h| (h.round() as u16) % 360)
    }

    /// Take the current roll as level.
    pub fn calibrate_heel(&mut self) -> NavResult<f64> {
        let roll = self
            .raw_roll()
            .ok_or_else(|| NavError::NoReading("no attitude reading to level against".into()))?;
        self.calibration.heel_angle_delta = roll;
        log::info!("Heel calibrated: delta {:.2}°", roll);
        Ok(roll)
    }

    /// Take the current heading as north.
    pub fn calibrate_compass(&mut self) -> NavResult<f64> {
        let heading = self
            .smoothed_heading
            .ok_or_else(|| NavError::NoReading("no heading reading to zero against".into()))?;
        self.calibration.compass_offset_delta = heading;
        log::info!("Compass calibrated: offset {:.1}°", heading);
        Ok(heading)
    }
}

/// Exponential smoothing on the circle. The new sample is unwrapped by ±360
/// to whichever representation sits nearest the previous value.
pub fn smooth_heading(prev: f64, raw: f64, alpha: f64) -> f64 {
    let mut target = raw;
    if target - prev > 180.0 {
        target -= 360.0;
    } else if prev - target > 180.0 {
        target += 360.0;
    }
    normalize_degrees(alpha * target + (1.0 - alpha) * prev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::angle_delta;
    use approx::assert_abs_diff_eq;

    fn roll_quaternion(deg: f64) -> Quaternion {
        let half = deg.to_radians() / 2.0;
        Quaternion { i: half.sin(), j: 0.0, k: 0.0, real: half.cos() }
    }

    fn pitch_quaternion(deg: f64) -> Quaternion {
        let half = deg.to_radians() / 2.0;
        Quaternion { i: 0.0, j: half.sin(), k: 0.0, real: half.cos() }
    }

    fn mag_at(heading_deg: f64) -> MagData {
        let h = heading_deg.to_radians();
        MagData { x: 30.0 * h.cos(), y: 30.0 * h.sin(), z: 0.0 }
    }

    #[test]
    fn test_identity_is_level() {
        let att = Attitude::from_quaternion(&Quaternion::IDENTITY);
        assert_eq!(att.roll, 0.0);
        assert_eq!(att.pitch, 0.0);
    }

    #[test]
    fn test_roll_from_quaternion() {
        let att = Attitude::from_quaternion(&roll_quaternion(30.0));
        assert_abs_diff_eq!(att.roll, 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(att.pitch, 0.0, epsilon = 1e-9);
        let att = Attitude::from_quaternion(&roll_quaternion(-12.0));
        assert_abs_diff_eq!(att.roll, -12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pitch_from_quaternion() {
        let att = Attitude::from_quaternion(&pitch_quaternion(10.0));
        assert_abs_diff_eq!(att.pitch, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(att.roll, 0.0, epsilon = 1e-9);
        let att = Attitude::from_quaternion(&pitch_quaternion(-25.0));
        assert_abs_diff_eq!(att.pitch, -25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_heel_zero_after_calibration() {
        let mut engine = OrientationEngine::new(&NavConfig::default(), CalibrationState::default());
        engine.update_attitude(&Quaternion::IDENTITY);
        assert_eq!(engine.heel(), Some(0.0));
        engine.calibrate_heel().unwrap();
        engine.update_attitude(&Quaternion::IDENTITY);
        assert_eq!(engine.heel(), Some(0.0));
    }

    #[test]
    fn test_heel_calibration_offsets_later_readings() {
        let mut engine = OrientationEngine::new(&NavConfig::default(), CalibrationState::default());
        engine.update_attitude(&roll_quaternion(3.0));
        assert_abs_diff_eq!(engine.calibrate_heel().unwrap(), 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(engine.heel().unwrap(), 0.0, epsilon = 1e-9);
        engine.update_attitude(&roll_quaternion(18.0));
        assert_abs_diff_eq!(engine.heel().unwrap(), 15.0, epsilon = 1e-9);
    }

    #[test]
    fn test_calibration_needs_a_reading() {
        let mut engine = OrientationEngine::new(&NavConfig::default(), CalibrationState::default());
        assert!(matches!(engine.calibrate_heel(), Err(NavError::NoReading(_))));
        assert!(matches!(engine.calibrate_compass(), Err(NavError::NoReading(_))));
    }

    #[test]
    fn test_smoothing_takes_short_path_across_north() {
        let smoothed = smooth_heading(359.0, 1.0, 0.8);
        assert_abs_diff_eq!(smoothed, 0.6, epsilon = 1e-9);
        assert!(angle_delta(smoothed, 1.0) < angle_delta(359.0, 1.0));

        let smoothed = smooth_heading(1.0, 359.0, 0.8);
        assert_abs_diff_eq!(smoothed, 359.4, epsilon = 1e-9);
    }

    #[test]
    fn test_engine_wraps_heading_through_north() {
        let mut engine = OrientationEngine::new(&NavConfig::default(), CalibrationState::default());
        engine.update_attitude(&Quaternion::IDENTITY);
        assert_eq!(engine.update_heading(&mag_at(359.0), 0.0), MagStatus::Accepted);
        assert_abs_diff_eq!(engine.smoothed_heading().unwrap(), 359.0, epsilon = 1e-6);
        assert_eq!(engine.update_heading(&mag_at(1.0), 0.1), MagStatus::Accepted);
        let h = engine.smoothed_heading().unwrap();
        assert!(h < 1.0, "went the long way round: {h}");
        assert_eq!(engine.hdm(), Some(1));
    }

    #[test]
    fn test_tilt_compensation_only_when_heeled() {
        let mag = MagData { x: 1.0, y: 0.5, z: 0.0 };
        let level = magnetic_heading(&mag, Some(Attitude { roll: 3.0, pitch: 0.0 }), 5.0);
        assert_abs_diff_eq!(level, 0.5f64.atan2(1.0).to_degrees(), epsilon = 1e-9);

        let heeled = magnetic_heading(&mag, Some(Attitude { roll: 30.0, pitch: 0.0 }), 5.0);
        let expected = (0.5 * 30f64.to_radians().cos()).atan2(1.0).to_degrees();
        assert_abs_diff_eq!(heeled, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_tilt_compensation_with_pitch() {
        let mag = MagData { x: 1.0, y: 0.5, z: 0.4 };
        let theta = 20f64.to_radians();

        let pitched = magnetic_heading(&mag, Some(Attitude { roll: 0.0, pitch: 20.0 }), 5.0);
        let expected = 0.5f64.atan2(theta.cos() + 0.4 * theta.sin()).to_degrees();
        assert_abs_diff_eq!(pitched, expected, epsilon = 1e-9);

        let phi = 15f64.to_radians();
        let both = magnetic_heading(&mag, Some(Attitude { roll: 15.0, pitch: 20.0 }), 5.0);
        let mx = theta.cos() + 0.5 * phi.sin() * theta.sin() + 0.4 * phi.cos() * theta.sin();
        let my = 0.5 * phi.cos() - 0.4 * phi.sin();
        assert_abs_diff_eq!(both, my.atan2(mx).to_degrees(), epsilon = 1e-9);

        // Small pitch is ignored
        let flat = magnetic_heading(&mag, Some(Attitude { roll: 0.0, pitch: 4.0 }), 5.0);
        assert_abs_diff_eq!(flat, 0.5f64.atan2(1.0).to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn test_engine_uses_pitch_from_quaternion() {
        let mut engine = OrientationEngine::new(&NavConfig::default(), CalibrationState::default());
        engine.update_attitude(&pitch_quaternion(20.0));
        engine.update_heading(&MagData { x: 10.0, y: 5.0, z: 4.0 }, 0.0);
        let theta = 20f64.to_radians();
        let expected = 5f64.atan2(10.0 * theta.cos() + 4.0 * theta.sin()).to_degrees();
        assert_abs_diff_eq!(engine.raw_heading().unwrap(), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_compass_offset_applied_to_hdm() {
        let mut engine = OrientationEngine::new(&NavConfig::default(), CalibrationState::default());
        engine.update_heading(&mag_at(90.0), 0.0);
        assert_eq!(engine.hdm(), Some(90));
        engine.calibrate_compass().unwrap();
        assert_eq!(engine.hdm(), Some(0));
        engine.update_heading(&mag_at(80.0), 0.1);
        // 0.8 * 80 + 0.2 * 90 = 82, minus 90
        assert_eq!(engine.hdm(), Some(352));
    }

    #[test]
    fn test_weak_and_unchanged_fields_ignored() {
        let mut engine = OrientationEngine::new(&NavConfig::default(), CalibrationState::default());
        assert_eq!(engine.update_heading(&MagData { x: 0.01, y: 0.0, z: 0.0 }, 0.0), MagStatus::TooWeak);
        assert_eq!(engine.smoothed_heading(), None);

        let mag = mag_at(45.0);
        assert_eq!(engine.update_heading(&mag, 0.0), MagStatus::Accepted);
        assert_eq!(engine.update_heading(&mag, 1.0), MagStatus::Unchanged);
        assert_eq!(engine.update_heading(&mag, 3.5), MagStatus::Stale);
        assert_eq!(engine.update_heading(&mag, 4.0), MagStatus::Unchanged);
        assert_eq!(engine.update_heading(&mag_at(50.0), 4.5), MagStatus::Accepted);
    }
}
