use crate::config::{NavConfig, SensorPresence};

/// Liveness of one sensor at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SensorStatus {
    /// Not detected at startup, never retried
    Absent,
    /// Present but has not produced a good reading yet
    Waiting,
    Healthy,
    /// No good reading for longer than the silence threshold
    Silent { secs: f64 },
}

impl SensorStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, SensorStatus::Healthy)
    }
}

/// Tracks health metrics for individual sensors
#[derive(Clone, Debug)]
pub struct SensorHealth {
    pub name: &'static str,
    pub present: bool,
    pub silence_threshold_secs: f64,
    last_update: Option<f64>,
    failures: u64,
    consecutive_failures: u32,
}

impl SensorHealth {
    pub fn new(name: &'static str, present: bool, silence_threshold_secs: f64) -> Self {
        SensorHealth {
            name,
            present,
            silence_threshold_secs,
            last_update: None,
            failures: 0,
            consecutive_failures: 0,
        }
    }

    /// A good reading arrived.
    pub fn update(&mut self, now: f64) {
        self.last_update = Some(now);
        self.consecutive_failures = 0;
    }

    /// A read attempt failed or was rejected.
    pub fn record_failure(&mut self) {
        self.failures += 1;
        self.consecutive_failures += 1;
    }

    pub fn last_update(&self) -> Option<f64> {
        self.last_update
    }

    pub fn time_since_last_update(&self, now: f64) -> Option<f64> {
        self.last_update.map(|t| now - t)
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Last good reading is recent enough to keep showing.
    pub fn is_fresh(&self, now: f64) -> bool {
        self.present
            && self
                .time_since_last_update(now)
                .is_some_and(|d| d <= self.silence_threshold_secs)
    }

    pub fn status(&self, now: f64) -> SensorStatus {
        if !self.present {
            return SensorStatus::Absent;
        }
        match self.time_since_last_update(now) {
            None => SensorStatus::Waiting,
            Some(d) if d > self.silence_threshold_secs => SensorStatus::Silent { secs: d },
            Some(_) => SensorStatus::Healthy,
        }
    }

    fn format_status(&self, now: f64) -> String {
        match self.status(now) {
            SensorStatus::Healthy => "✓".to_string(),
            SensorStatus::Waiting => "… (no data)".to_string(),
            SensorStatus::Silent { secs } => format!("⚠ (silent {:.1}s)", secs),
            SensorStatus::Absent => "✗ (absent)".to_string(),
        }
    }
}

/// Per-sensor health for the three inputs of the pipeline.
#[derive(Clone, Debug)]
pub struct HealthMonitor {
    pub gps: SensorHealth,
    pub imu: SensorHealth,
    pub wind: SensorHealth,
}

impl HealthMonitor {
    pub fn new(config: &NavConfig, presence: SensorPresence) -> Self {
        HealthMonitor {
            gps: SensorHealth::new("GPS", presence.gps, config.gps_stale_secs),
            imu: SensorHealth::new("IMU", presence.imu, config.imu_stale_secs),
            wind: SensorHealth::new("Wind", presence.wind, config.wind_stale_secs),
        }
    }

    pub fn check_health(&self, now: f64) -> HealthReport {
        HealthReport {
            gps: self.gps.status(now),
            imu: self.imu.status(now),
            wind: self.wind.status(now),
            gps_failures: self.gps.failures(),
            imu_failures: self.imu.failures(),
            wind_failures: self.wind.failures(),
        }
    }

    /// Format health status for logging
    pub fn format_status(&self, now: f64) -> String {
        format!(
            "Health: GPS {} | IMU {} | Wind {}",
            self.gps.format_status(now),
            self.imu.format_status(now),
            self.wind.format_status(now)
        )
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(&NavConfig::default(), SensorPresence::default())
    }
}

/// Report of sensor health status
#[derive(Clone, Debug, PartialEq)]
pub struct HealthReport {
    pub gps: SensorStatus,
    pub imu: SensorStatus,
    pub wind: SensorStatus,
    pub gps_failures: u64,
    pub imu_failures: u64,
    pub wind_failures: u64,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.gps.is_healthy() && self.imu.is_healthy() && self.wind.is_healthy()
    }
}
