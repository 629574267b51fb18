//! GPS speed-over-ground filter.
//!
//! Turns raw receiver speed into a stable knots value. Poor fixes decay the
//! last good value instead of stepping to zero, sub-threshold speeds are
//! zeroed unless the movement classifier vouches for them, and leaving the
//! stationary state needs a small hysteresis margin.

use crate::config::NavConfig;
use crate::movement::{MovementClassifier, MovementVerdict, TrackPoint};
use crate::types::GpsFix;

/// Detail of one filter step, for logging and events.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpeedDecision {
    /// Quality gate failed, last speed decayed
    Decayed,
    /// Below noise threshold but the classifier says moving
    LowButMoving,
    /// Below noise threshold and not moving
    ZeroedAsNoise,
    /// Above threshold but not enough to leave the stationary state
    HeldStationary,
    Accepted,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedOutput {
    pub speed: f64,
    pub decision: SpeedDecision,
    pub smoothed: f64,
    pub noise_threshold: f64,
    pub verdict: Option<MovementVerdict>,
}

pub struct GpsSpeedFilter {
    config: NavConfig,
    last_valid_speed: f64,
}

impl GpsSpeedFilter {
    pub fn new(config: &NavConfig) -> Self {
        Self { config: config.clone(), last_valid_speed: 0.0 }
    }

    pub fn last_valid_speed(&self) -> f64 {
        self.last_valid_speed
    }

    pub fn quality_ok(&self, satellites: u8, hdop: f64) -> bool {
        satellites >= self.config.gps_min_satellites && hdop <= self.config.gps_max_hdop
    }

    /// Noise floor in knots given how sure the classifier is.
    pub fn noise_threshold(&self, verdict: &MovementVerdict) -> f64 {
        if verdict.confirmed_moving() {
            self.config.noise_threshold_moving
        } else if verdict.confirmed_stationary() {
            self.config.noise_threshold_stationary
        } else {
            self.config.noise_threshold_base
        }
    }

    /// Run one fix through the filter. The fix is always recorded in the
    /// classifier's track buffer, flagged invalid when it fails the gate.
    pub fn update(&mut self, fix: &GpsFix, classifier: &mut MovementClassifier, now: f64) -> SpeedOutput {
        let quality_ok = self.quality_ok(fix.satellites, fix.hdop);
        classifier.record_track_point(TrackPoint::from_fix(fix, fix.valid && quality_ok));

        if !quality_ok {
            self.last_valid_speed *= self.config.outage_decay;
            return SpeedOutput {
                speed: self.last_valid_speed,
                decision: SpeedDecision::Decayed,
                smoothed: f64::NAN,
                noise_threshold: f64::NAN,
                verdict: None,
            };
        }

        let recent: Vec<f64> = classifier
            .track()
            .newest(self.config.speed_smoothing_window)
            .filter(|p| p.valid)
            .map(|p| p.speed)
            .collect();
        let smoothed = if recent.is_empty() {
            fix.speed
        } else {
            recent.iter().sum::<f64>() / recent.len() as f64
        };

        let verdict = classifier.verdict(now);
        let threshold = self.noise_threshold(&verdict);

        let (speed, decision) = if smoothed < threshold {
            if verdict.moving {
                self.last_valid_speed = smoothed;
                (smoothed, SpeedDecision::LowButMoving)
            } else {
                self.last_valid_speed = 0.0;
                (0.0, SpeedDecision::ZeroedAsNoise)
            }
        } else if self.last_valid_speed < threshold {
            if smoothed > threshold + self.config.speed_hysteresis_kn {
                self.last_valid_speed = smoothed;
                (smoothed, SpeedDecision::Accepted)
            } else {
                (0.0, SpeedDecision::HeldStationary)
            }
        } else {
            self.last_valid_speed = smoothed;
            (smoothed, SpeedDecision::Accepted)
        };

        SpeedOutput { speed, decision, smoothed, noise_threshold: threshold, verdict: Some(verdict) }
    }
}
