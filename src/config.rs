use serde::{Deserialize, Serialize};

use crate::wind::WindFrame;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    // ── GPS track analysis ──
    pub track_analysis_interval_secs: f64,
    pub track_min_points: usize,
    pub track_bearing_min_segment_m: f64,
    pub track_stationary_max_avg_m: f64,
    pub track_moving_min_avg_m: f64,
    pub track_max_bearing_change_deg: f64,

    // ── Accelerometer analysis ──
    pub accel_analysis_interval_secs: f64,
    pub accel_min_samples: usize,
    pub accel_gravity_min: f64,
    pub accel_gravity_max: f64,
    pub accel_std_dev_threshold: f64,
    pub accel_range_threshold: f64,

    // ── GPS speed filter ──
    pub gps_min_satellites: u8,
    pub gps_max_hdop: f64,
    pub outage_decay: f64,
    pub speed_smoothing_window: usize,
    pub noise_threshold_base: f64,
    pub noise_threshold_moving: f64,
    pub noise_threshold_stationary: f64,
    pub speed_hysteresis_kn: f64,

    // ── Orientation ──
    pub imu_min_interval_secs: f64,
    pub tilt_compensation_min_deg: f64,
    pub heading_smoothing_alpha: f64,
    pub mag_min_field: f64,
    pub mag_change_epsilon: f64,
    pub mag_stale_warn_secs: f64,

    // ── Wind ──
    pub wind_ms_to_knots: f64,
    pub true_wind_min_boat_speed_kn: f64,
    pub wind_frame: WindFrame,

    // ── Staleness (transient failure grace period) ──
    pub gps_stale_secs: f64,
    pub imu_stale_secs: f64,
    pub wind_stale_secs: f64,

    // ── Diagnostics ──
    pub status_interval_secs: f64,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            track_analysis_interval_secs: 2.0,
            track_min_points: 3,
            track_bearing_min_segment_m: 2.0,
            track_stationary_max_avg_m: 3.0,
            track_moving_min_avg_m: 5.0,
            track_max_bearing_change_deg: 45.0,
            accel_analysis_interval_secs: 0.5,
            accel_min_samples: 3,
            accel_gravity_min: 8.0,
            accel_gravity_max: 12.0,
            accel_std_dev_threshold: 0.5,
            accel_range_threshold: 1.0,
            gps_min_satellites: 4,
            gps_max_hdop: 3.0,
            outage_decay: 0.95,
            speed_smoothing_window: 3,
            noise_threshold_base: 0.08,
            noise_threshold_moving: 0.05,
            noise_threshold_stationary: 0.12,
            speed_hysteresis_kn: 0.1,
            imu_min_interval_secs: 0.05,
            tilt_compensation_min_deg: 5.0,
            heading_smoothing_alpha: 0.8,
            mag_min_field: 0.1,
            mag_change_epsilon: 0.01,
            mag_stale_warn_secs: 3.0,
            wind_ms_to_knots: 1.944,
            true_wind_min_boat_speed_kn: 0.5,
            wind_frame: WindFrame::World,
            gps_stale_secs: 5.0,
            imu_stale_secs: 1.0,
            wind_stale_secs: 5.0,
            status_interval_secs: 5.0,
        }
    }
}

impl NavConfig {
    /// Parse a JSON config. Missing keys keep their default value.
    pub fn from_json(json: &str) -> crate::NavResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Which sensors answered at startup. A missing sensor is never retried for
/// the rest of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorPresence {
    pub gps: bool,
    pub imu: bool,
    pub wind: bool,
}

impl Default for SensorPresence {
    fn default() -> Self {
        Self { gps: true, imu: true, wind: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = NavConfig::from_json(r#"{ "gps_max_hdop": 2.5, "wind_frame": "vessel" }"#).unwrap();
        assert_eq!(config.gps_max_hdop, 2.5);
        assert_eq!(config.wind_frame, WindFrame::Vessel);
        assert_eq!(config.gps_min_satellites, 4);
        assert_eq!(config.outage_decay, 0.95);
    }

    #[test]
    fn test_bad_json_is_serialization_error() {
        let err = NavConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::NavError::Serialization(_)));
    }
}
