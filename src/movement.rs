//! Movement classifier.
//!
//! Decides whether the boat is really moving from two independent sources:
//! the shape of the recent GPS track and the variance of the accelerometer
//! magnitude. GPS drift near zero speed produces big jumps with random
//! bearings, which the track analysis rejects; slow but genuine motion still
//! shows up as accelerometer variance.

use crate::config::NavConfig;
use crate::geodesy;
use crate::ring_buffer::RingBuffer;
use crate::types::{AccelData, GpsFix};

pub const GPS_TRACK_CAPACITY: usize = 10;
pub const ACCEL_CAPACITY: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub timestamp: f64,
    pub valid: bool,
}

impl TrackPoint {
    pub fn from_fix(fix: &GpsFix, valid: bool) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed: fix.speed,
            timestamp: fix.timestamp,
            valid,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub magnitude: f64,
    pub timestamp: f64,
    pub valid: bool,
}

impl AccelSample {
    pub fn new(accel: &AccelData, timestamp: f64) -> Self {
        let magnitude = accel.magnitude();
        Self {
            x: accel.x,
            y: accel.y,
            z: accel.z,
            magnitude,
            timestamp,
            valid: magnitude.is_finite(),
        }
    }
}

/// Outcome of one track evaluation, kept for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackStats {
    pub segments: usize,
    pub avg_distance_m: f64,
    pub avg_bearing_change_deg: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccelStats {
    pub samples: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl AccelStats {
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Combined classifier output for one query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MovementVerdict {
    pub gps_moving: bool,
    /// `None` when no IMU is fitted
    pub accel_moving: Option<bool>,
    pub moving: bool,
}

impl MovementVerdict {
    /// Both sources present and both report movement.
    pub fn confirmed_moving(&self) -> bool {
        self.gps_moving && self.accel_moving == Some(true)
    }

    /// Both sources present and both report no movement.
    pub fn confirmed_stationary(&self) -> bool {
        !self.gps_moving && self.accel_moving == Some(false)
    }
}

pub struct MovementClassifier {
    config: NavConfig,
    imu_present: bool,

    track: RingBuffer<TrackPoint, GPS_TRACK_CAPACITY>,
    accel: RingBuffer<AccelSample, ACCEL_CAPACITY>,

    // Cached sub-analysis results, re-evaluated on their own intervals
    last_track_analysis: Option<f64>,
    track_moving: bool,
    last_track_stats: TrackStats,

    last_accel_analysis: Option<f64>,
    accel_moving: bool,
    last_accel_stats: AccelStats,
}

impl MovementClassifier {
    pub fn new(config: &NavConfig, imu_present: bool) -> Self {
        Self {
            config: config.clone(),
            imu_present,
            track: RingBuffer::new(),
            accel: RingBuffer::new(),
            last_track_analysis: None,
            track_moving: false,
            last_track_stats: TrackStats::default(),
            last_accel_analysis: None,
            accel_moving: false,
            last_accel_stats: AccelStats::default(),
        }
    }

    pub fn record_track_point(&mut self, point: TrackPoint) {
        self.track.push(point);
    }

    pub fn record_accel(&mut self, accel: &AccelData, timestamp: f64) {
        if !self.imu_present {
            return;
        }
        self.accel.push(AccelSample::new(accel, timestamp));
    }

    pub fn track(&self) -> &RingBuffer<TrackPoint, GPS_TRACK_CAPACITY> {
        &self.track
    }

    pub fn imu_present(&self) -> bool {
        self.imu_present
    }

    pub fn last_track_stats(&self) -> TrackStats {
        self.last_track_stats
    }

    pub fn last_accel_stats(&self) -> AccelStats {
        self.last_accel_stats
    }

    /// Evaluate both sub-analyses (each honours its own interval) and combine.
    pub fn verdict(&mut self, now: f64) -> MovementVerdict {
        let gps_moving = self.gps_track_moving(now);
        if !self.imu_present {
            return MovementVerdict { gps_moving, accel_moving: None, moving: gps_moving };
        }
        let accel_moving = self.accel_moving(now);
        MovementVerdict {
            gps_moving,
            accel_moving: Some(accel_moving),
            // Either source can assert movement; stationary needs both
            moving: gps_moving || accel_moving,
        }
    }

    /// Track-consistency analysis. Cached for `track_analysis_interval_secs`.
    pub fn gps_track_moving(&mut self, now: f64) -> bool {
        if let Some(last) = self.last_track_analysis {
            if now - last < self.config.track_analysis_interval_secs {
                return self.track_moving;
            }
        }
        self.last_track_analysis = Some(now);

        if self.track.len() < self.config.track_min_points {
            self.track_moving = false;
            return false;
        }

        let points: Vec<&TrackPoint> = self.track.iter().collect();
        let mut total_distance = 0.0;
        let mut segments = 0usize;
        let mut total_bearing_change = 0.0;
        let mut bearing_changes = 0usize;
        let mut last_bearing: Option<f64> = None;

        for pair in points.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            if !prev.valid || !curr.valid {
                continue;
            }
            let d = geodesy::distance(prev.latitude, prev.longitude, curr.latitude, curr.longitude);
            total_distance += d;
            segments += 1;

            // Bearings over tiny segments are dominated by position noise
            if d > self.config.track_bearing_min_segment_m {
                let b = geodesy::bearing(prev.latitude, prev.longitude, curr.latitude, curr.longitude);
                if let Some(lb) = last_bearing {
                    total_bearing_change += geodesy::angle_delta(b, lb);
                    bearing_changes += 1;
                }
                last_bearing = Some(b);
            }
        }

        if segments < 2 {
            self.last_track_stats = TrackStats { segments, ..TrackStats::default() };
            self.track_moving = false;
            return false;
        }

        let avg_distance = total_distance / segments as f64;
        let avg_bearing_change = total_bearing_change / bearing_changes.max(1) as f64;
        self.last_track_stats = TrackStats {
            segments,
            avg_distance_m: avg_distance,
            avg_bearing_change_deg: avg_bearing_change,
        };

        if avg_distance < self.config.track_stationary_max_avg_m {
            self.track_moving = false;
        } else if avg_distance > self.config.track_moving_min_avg_m {
            self.track_moving = avg_bearing_change < self.config.track_max_bearing_change_deg;
        }
        // 3-5 m band keeps the previous result

        log::debug!(
            "[track] segments={} avg={:.2} m bearing_change={:.1}° moving={}",
            segments, avg_distance, avg_bearing_change, self.track_moving
        );
        self.track_moving
    }

    /// Accelerometer variance analysis. Cached for `accel_analysis_interval_secs`.
    pub fn accel_moving(&mut self, now: f64) -> bool {
        if !self.imu_present {
            return false;
        }
        let valid: Vec<f64> = self.accel.iter().filter(|s| s.valid).map(|s| s.magnitude).collect();
        if valid.len() < self.config.accel_min_samples {
            return false;
        }

        if let Some(last) = self.last_accel_analysis {
            if now - last < self.config.accel_analysis_interval_secs {
                return self.accel_moving;
            }
        }
        self.last_accel_analysis = Some(now);

        let n = valid.len() as f64;
        let mean = valid.iter().sum::<f64>() / n;
        let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
        let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = valid.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / n;
        let stats = AccelStats { samples: valid.len(), mean, min, max, std_dev: variance.sqrt() };
        self.last_accel_stats = stats;

        // Mean away from 1 g means the sensor is not seeing gravity: discard the window
        let plausible = mean >= self.config.accel_gravity_min && mean <= self.config.accel_gravity_max;
        if !plausible {
            log::warn!("[accel] implausible mean magnitude {:.2} m/s², window ignored", mean);
        }

        self.accel_moving = plausible
            && (stats.std_dev > self.config.accel_std_dev_threshold
                || stats.range() > self.config.accel_range_threshold);

        log::debug!(
            "[accel] mean={:.2} std={:.2} range={:.2} moving={}",
            mean, stats.std_dev, stats.range(), self.accel_moving
        );
        self.accel_moving
    }
}
