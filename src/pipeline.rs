// pipeline.rs — Per-tick orchestration of the navigation pipeline
//
// Everything in this module is independent of:
//   - the serial / RS485 / I2C transports
//   - the wireless link and its framing
//   - the settings storage format
//
// Sensor samples go in through the feed_* methods, one NavigationSnapshot
// comes out per tick. Each feed returns the events it raised so a caller can
// log or count them. Recorded sessions replay through exactly the same path.

use crate::calibration::{CalibrationState, CalibrationStore};
use crate::command::Command;
use crate::config::{NavConfig, SensorPresence};
use crate::error::{NavError, NavResult};
use crate::gps_source::NmeaFixDecoder;
use crate::health::HealthMonitor;
use crate::movement::{MovementClassifier, MovementVerdict, TrackPoint};
use crate::orientation::{MagStatus, OrientationEngine};
use crate::snapshot::{NavigationSnapshot, SnapshotAssembler, SnapshotSources};
use crate::speed_filter::{GpsSpeedFilter, SpeedDecision};
use crate::stats::SessionStats;
use crate::types::{AccelData, GpsFix, ImuReading, RawWind};
use crate::wind::{self, ApparentWind};
use crate::wind_sensor::{RegisterBus, RegisterFormat, WindReadError, WindSensor};

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum NavEvent {
    /// Transport tagged the fix invalid. Recorded as a track gap, speed not
    /// filtered
    GpsFixInvalid { satellites: u8 },
    /// Fix failed the satellite / HDOP gate
    GpsRejected { satellites: u8, hdop: f64 },
    SpeedDecayed { speed: f64 },
    /// Sub-threshold speed treated as GPS noise
    SpeedZeroed { smoothed: f64, threshold: f64 },
    MovementChanged { moving: bool },
    MagnetometerStale,
    WindReadFailed { error: WindReadError },
    WindFormatLocked { format: RegisterFormat },
    HeelCalibrated { delta: f64 },
    CompassCalibrated { delta: f64 },
}

impl NavEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NavEvent::GpsFixInvalid { .. } => "gps_fix_invalid",
            NavEvent::GpsRejected { .. } => "gps_rejected",
            NavEvent::SpeedDecayed { .. } => "speed_decayed",
            NavEvent::SpeedZeroed { .. } => "speed_zeroed",
            NavEvent::MovementChanged { .. } => "movement_changed",
            NavEvent::MagnetometerStale => "magnetometer_stale",
            NavEvent::WindReadFailed { .. } => "wind_read_failed",
            NavEvent::WindFormatLocked { .. } => "wind_format_locked",
            NavEvent::HeelCalibrated { .. } => "heel_calibrated",
            NavEvent::CompassCalibrated { .. } => "compass_calibrated",
        }
    }
}

// ─── The pipeline ────────────────────────────────────────────────────────────

pub struct NavPipeline {
    config: NavConfig,
    presence: SensorPresence,

    classifier: MovementClassifier,
    speed_filter: GpsSpeedFilter,
    orientation: OrientationEngine,
    assembler: SnapshotAssembler,
    health: HealthMonitor,
    stats: SessionStats,

    // Latest component outputs with the time they were produced
    last_fix: Option<(GpsFix, f64)>,
    sog: Option<(f64, f64)>,
    apparent_wind: Option<(ApparentWind, f64)>,
    last_accel: Option<AccelData>,
    last_verdict: Option<MovementVerdict>,

    // Timing
    last_imu_ts: Option<f64>,
    last_status_log: Option<f64>,
    last_snapshot: Option<NavigationSnapshot>,
}

impl NavPipeline {
    pub fn new(config: NavConfig, presence: SensorPresence, calibration: CalibrationState) -> Self {
        log::info!(
            "Navigation pipeline starting: GPS {} | IMU {} | Wind {}",
            present_str(presence.gps),
            present_str(presence.imu),
            present_str(presence.wind)
        );
        Self {
            classifier: MovementClassifier::new(&config, presence.imu),
            speed_filter: GpsSpeedFilter::new(&config),
            orientation: OrientationEngine::new(&config, calibration),
            assembler: SnapshotAssembler::new(),
            health: HealthMonitor::new(&config, presence),
            stats: SessionStats::default(),
            last_fix: None,
            sog: None,
            apparent_wind: None,
            last_accel: None,
            last_verdict: None,
            last_imu_ts: None,
            last_status_log: None,
            last_snapshot: None,
            presence,
            config,
        }
    }

    // ── Sensor feeds ─────────────────────────────────────────────────────

    /// Feed one decoded GPS fix.
    pub fn feed_gps(&mut self, fix: &GpsFix, now: f64) -> Vec<NavEvent> {
        let mut events = Vec::new();
        if !self.presence.gps {
            return events;
        }
        self.last_fix = Some((fix.clone(), now));

        if !fix.valid {
            self.classifier.record_track_point(TrackPoint::from_fix(fix, false));
            self.health.gps.record_failure();
            events.push(NavEvent::GpsFixInvalid { satellites: fix.satellites });
            return events;
        }

        let out = self.speed_filter.update(fix, &mut self.classifier, now);
        self.sog = Some((out.speed, now));

        match out.decision {
            SpeedDecision::Decayed => {
                self.health.gps.record_failure();
                log::debug!(
                    "GPS fix rejected ({} sats, HDOP {:.1}), speed decayed to {:.2} kn",
                    fix.satellites, fix.hdop, out.speed
                );
                events.push(NavEvent::GpsRejected { satellites: fix.satellites, hdop: fix.hdop });
                events.push(NavEvent::SpeedDecayed { speed: out.speed });
            }
            SpeedDecision::ZeroedAsNoise => {
                self.health.gps.update(now);
                events.push(NavEvent::SpeedZeroed { smoothed: out.smoothed, threshold: out.noise_threshold });
            }
            _ => self.health.gps.update(now),
        }

        if let Some(verdict) = out.verdict {
            let changed = self.last_verdict.is_some_and(|v| v.moving != verdict.moving);
            if changed {
                log::info!(
                    "Movement: {} (gps {}, accel {:?})",
                    if verdict.moving { "moving" } else { "stationary" },
                    verdict.gps_moving,
                    verdict.accel_moving
                );
                events.push(NavEvent::MovementChanged { moving: verdict.moving });
            }
            self.last_verdict = Some(verdict);
        }

        events
    }

    /// Push raw NMEA bytes through `decoder` and feed any fix it completes.
    /// Returns how many bytes were consumed; the rest belongs to the next tick.
    pub fn feed_nmea(&mut self, decoder: &mut NmeaFixDecoder, bytes: &[u8], now: f64) -> (usize, Vec<NavEvent>) {
        let ingested = decoder.ingest(bytes, now);
        let events = match ingested.fix {
            Some(fix) => self.feed_gps(&fix, now),
            None => Vec::new(),
        };
        (ingested.consumed, events)
    }

    /// Feed one IMU report. Reports closer together than the IMU interval are
    /// dropped.
    pub fn feed_imu(&mut self, reading: &ImuReading, now: f64) -> Vec<NavEvent> {
        let mut events = Vec::new();
        if !self.presence.imu {
            return events;
        }

        if let Some(prev) = self.last_imu_ts {
            if now - prev < self.config.imu_min_interval_secs {
                return events;
            }
        }
        self.last_imu_ts = Some(now);

        let mut got_data = false;

        if let Some(q) = &reading.quaternion {
            self.orientation.update_attitude(q);
            got_data = true;
        }

        if let Some(mag) = &reading.mag {
            match self.orientation.update_heading(mag, now) {
                MagStatus::Accepted | MagStatus::Unchanged => got_data = true,
                MagStatus::Stale => events.push(NavEvent::MagnetometerStale),
                MagStatus::TooWeak => log::debug!("Magnetometer field too weak, heading not updated"),
            }
        }

        if let Some(accel) = &reading.accel {
            self.classifier.record_accel(accel, now);
            self.last_accel = Some(*accel);
            got_data = true;
        }

        if got_data {
            self.health.imu.update(now);
        } else {
            self.health.imu.record_failure();
        }
        events
    }

    /// Feed the outcome of one wind read attempt.
    pub fn feed_wind(&mut self, reading: Result<RawWind, WindReadError>, now: f64) -> Vec<NavEvent> {
        let mut events = Vec::new();
        if !self.presence.wind {
            return events;
        }

        match reading {
            Ok(raw) => {
                let apparent = ApparentWind::from_raw(&raw, self.config.wind_ms_to_knots);
                self.apparent_wind = Some((apparent, now));
                self.health.wind.update(now);
            }
            Err(WindReadError::RateLimited) => {}
            Err(error) => {
                self.health.wind.record_failure();
                if self.health.wind.consecutive_failures() == 1 {
                    log::warn!("Wind read failed: {}", error);
                } else {
                    log::debug!("Wind read failed ({} in a row): {}", self.health.wind.consecutive_failures(), error);
                }
                events.push(NavEvent::WindReadFailed { error });
            }
        }
        events
    }

    /// Poll `sensor` once and feed the result.
    pub fn poll_wind<B: RegisterBus>(&mut self, sensor: &mut WindSensor<B>, now: f64) -> Vec<NavEvent> {
        let was_locked = sensor.state().is_locked();
        let reading = sensor.poll(now);
        let mut events = Vec::new();
        if !was_locked && sensor.state().is_locked() {
            events.push(NavEvent::WindFormatLocked { format: sensor.state().format() });
        }
        events.extend(self.feed_wind(reading, now));
        events
    }

    // ── Commands ─────────────────────────────────────────────────────────

    /// Apply a calibration command and persist the new offsets. The new
    /// offsets stay in effect even when persisting fails.
    pub fn apply_command(&mut self, command: Command, store: &mut dyn CalibrationStore) -> NavResult<NavEvent> {
        if !self.presence.imu {
            return Err(NavError::SensorUnavailable("IMU"));
        }
        let event = match command {
            Command::ResetHeelAngle => NavEvent::HeelCalibrated { delta: self.orientation.calibrate_heel()? },
            Command::ResetCompassOffset => NavEvent::CompassCalibrated { delta: self.orientation.calibrate_compass()? },
        };
        store.save(&self.orientation.calibration())?;
        Ok(event)
    }

    // ── Per-tick output ──────────────────────────────────────────────────

    pub fn snapshot(&mut self, now: f64, link_quality: Option<i32>) -> NavigationSnapshot {
        let gps_fresh = |t: f64| now - t <= self.config.gps_stale_secs;

        let fix = self
            .last_fix
            .as_ref()
            .filter(|(_, t)| self.presence.gps && gps_fresh(*t))
            .map(|(f, _)| f);
        let sog = self
            .sog
            .filter(|(_, t)| self.presence.gps && gps_fresh(*t))
            .map(|(s, _)| s);

        let imu_fresh = self.health.imu.is_fresh(now);
        let heel = self.orientation.heel().filter(|_| imu_fresh);
        let heading = self.orientation.heading().filter(|_| imu_fresh);
        let hdm = self.orientation.hdm().filter(|_| imu_fresh);
        let accel = self.last_accel.filter(|_| imu_fresh);

        let apparent_wind = self
            .apparent_wind
            .filter(|(_, t)| self.presence.wind && now - t <= self.config.wind_stale_secs)
            .map(|(w, _)| w);

        // Heading for the world-frame direction: compass first, then COG
        let course = heading.or_else(|| fix.filter(|f| f.valid).and_then(|f| f.course));
        // No usable boat speed reads as stopped, so true wind falls back to apparent
        let true_wind = apparent_wind.map(|aw| {
            wind::true_wind(
                &aw,
                sog.unwrap_or(0.0),
                course,
                self.config.wind_frame,
                self.config.true_wind_min_boat_speed_kn,
            )
        });

        let sources = SnapshotSources { fix, sog, apparent_wind, true_wind, heel, hdm, accel, link_quality };
        let snapshot = self.assembler.assemble(now, &sources);
        self.stats.update(&snapshot);
        self.last_snapshot = Some(snapshot.clone());

        if self.last_status_log.map_or(true, |t| now - t >= self.config.status_interval_secs) {
            self.last_status_log = Some(now);
            log::info!("{}", self.status_line(now));
        }

        snapshot
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// One-line summary of the latest snapshot and sensor health.
    pub fn status_line(&self, now: f64) -> String {
        let health = self.health.format_status(now);
        let Some(s) = &self.last_snapshot else {
            return format!("{} | no snapshot yet", health);
        };
        format!(
            "{} | SOG {} | AWS {} AWA {} | TWS {} TWA {} | Heel {} | HDM {}",
            health,
            fmt_num(s.sog, "kn"),
            fmt_num(s.aws, "kn"),
            fmt_num(s.awa, "°"),
            fmt_num(s.tws, "kn"),
            fmt_num(s.twa, "°"),
            fmt_num(s.heel, "°"),
            s.hdm.map_or("--".to_string(), |h| format!("{}°", h)),
        )
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    pub fn calibration(&self) -> CalibrationState {
        self.orientation.calibration()
    }

    pub fn verdict(&self) -> Option<MovementVerdict> {
        self.last_verdict
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn presence(&self) -> SensorPresence {
        self.presence
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }
}

fn present_str(present: bool) -> &'static str {
    if present { "present" } else { "absent" }
}

fn fmt_num(v: f64, unit: &str) -> String {
    if v.is_finite() {
        format!("{:.1}{}", v, unit)
    } else {
        "--".to_string()
    }
}
