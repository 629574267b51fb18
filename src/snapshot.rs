//! The per-tick output record.
//!
//! Every field that has no valid source this tick is NaN (or `None` for
//! integer fields) so a display can tell "calm" or "level" from "no data".
//! NaN serialises to JSON `null`.

use serde::Serialize;

use crate::geodesy::normalize_degrees;
use crate::types::{AccelData, GpsFix};
use crate::wind::{ApparentWind, TrueWind};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NavigationSnapshot {
    pub seq: u64,
    pub timestamp: f64,

    /// Filtered speed over ground, knots
    #[serde(rename = "SOG")]
    pub sog: f64,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    #[serde(rename = "COG")]
    pub cog: f64,
    pub satellites: Option<u8>,
    pub hdop: f64,

    #[serde(rename = "AWS")]
    pub aws: f64,
    #[serde(rename = "AWA")]
    pub awa: f64,
    #[serde(rename = "TWS")]
    pub tws: f64,
    #[serde(rename = "TWA")]
    pub twa: f64,
    #[serde(rename = "TWD")]
    pub twd: f64,

    /// Degrees, negative to port
    pub heel: f64,
    #[serde(rename = "HDM")]
    pub hdm: Option<u16>,

    #[serde(rename = "accelX")]
    pub accel_x: f64,
    #[serde(rename = "accelY")]
    pub accel_y: f64,
    #[serde(rename = "accelZ")]
    pub accel_z: f64,

    /// Link quality of the transport, dBm
    #[serde(rename = "rssi")]
    pub link_quality: Option<i32>,
}

impl NavigationSnapshot {
    pub fn has_position(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Latest valid outputs of each component for one tick.
#[derive(Clone, Debug, Default)]
pub struct SnapshotSources<'a> {
    /// Most recent fix, only when it is still fresh
    pub fix: Option<&'a GpsFix>,
    pub sog: Option<f64>,
    pub apparent_wind: Option<ApparentWind>,
    pub true_wind: Option<TrueWind>,
    pub heel: Option<f64>,
    pub hdm: Option<u16>,
    pub accel: Option<AccelData>,
    pub link_quality: Option<i32>,
}

#[derive(Debug, Default)]
pub struct SnapshotAssembler {
    seq: u64,
}

impl SnapshotAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assemble(&mut self, now: f64, sources: &SnapshotSources) -> NavigationSnapshot {
        self.seq += 1;
        let nan = f64::NAN;

        let fix = sources.fix.filter(|f| f.valid);
        let accel = sources.accel;

        NavigationSnapshot {
            seq: self.seq,
            timestamp: now,
            sog: sources.sog.unwrap_or(nan),
            latitude: fix.map_or(nan, |f| f.latitude),
            longitude: fix.map_or(nan, |f| f.longitude),
            cog: fix.and_then(|f| f.course).map(normalize_degrees).unwrap_or(nan),
            satellites: sources.fix.map(|f| f.satellites),
            hdop: sources.fix.map_or(nan, |f| f.hdop),
            aws: sources.apparent_wind.map_or(nan, |w| w.speed),
            awa: sources.apparent_wind.map_or(nan, |w| w.angle),
            tws: sources.true_wind.map_or(nan, |w| w.speed),
            twa: sources.true_wind.map_or(nan, |w| w.angle),
            twd: sources.true_wind.and_then(|w| w.direction).unwrap_or(nan),
            heel: sources.heel.unwrap_or(nan),
            hdm: sources.hdm,
            accel_x: accel.map_or(nan, |a| a.x),
            accel_y: accel.map_or(nan, |a| a.y),
            accel_z: accel.map_or(nan, |a| a.z),
            link_quality: sources.link_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix() -> GpsFix {
        GpsFix {
            timestamp: 1.0,
            latitude: 43.29,
            longitude: 5.36,
            speed: 4.1,
            course: Some(212.0),
            satellites: 9,
            hdop: 0.8,
            valid: true,
        }
    }

    #[test]
    fn test_empty_sources_are_all_unknown() {
        let mut assembler = SnapshotAssembler::new();
        let snap = assembler.assemble(0.0, &SnapshotSources::default());
        assert_eq!(snap.seq, 1);
        for v in [snap.sog, snap.latitude, snap.cog, snap.hdop, snap.aws, snap.awa, snap.tws, snap.twa, snap.twd, snap.heel, snap.accel_z] {
            assert!(v.is_nan());
        }
        assert_eq!(snap.hdm, None);
        assert_eq!(snap.satellites, None);
        assert!(!snap.has_position());
    }

    #[test]
    fn test_zero_is_not_unknown() {
        let mut assembler = SnapshotAssembler::new();
        let f = fix();
        let sources = SnapshotSources {
            fix: Some(&f),
            sog: Some(0.0),
            heel: Some(0.0),
            hdm: Some(0),
            ..Default::default()
        };
        let snap = assembler.assemble(2.0, &sources);
        assert_eq!(snap.sog, 0.0);
        assert_eq!(snap.heel, 0.0);
        assert_eq!(snap.hdm, Some(0));
        assert_eq!(snap.cog, 212.0);
        assert!(snap.has_position());
    }

    #[test]
    fn test_invalid_fix_keeps_quality_only() {
        let mut assembler = SnapshotAssembler::new();
        let mut f = fix();
        f.valid = false;
        f.satellites = 2;
        let snap = assembler.assemble(0.0, &SnapshotSources { fix: Some(&f), ..Default::default() });
        assert!(snap.latitude.is_nan());
        assert!(snap.cog.is_nan());
        assert_eq!(snap.satellites, Some(2));
    }

    #[test]
    fn test_course_of_360_reads_as_north() {
        let mut assembler = SnapshotAssembler::new();
        let mut f = fix();
        f.course = Some(360.0);
        let snap = assembler.assemble(0.0, &SnapshotSources { fix: Some(&f), ..Default::default() });
        assert_eq!(snap.cog, 0.0);

        f.course = Some(-15.0);
        let snap = assembler.assemble(0.1, &SnapshotSources { fix: Some(&f), ..Default::default() });
        assert_eq!(snap.cog, 345.0);
    }

    #[test]
    fn test_json_uses_marine_names() {
        let mut assembler = SnapshotAssembler::new();
        let f = fix();
        let sources = SnapshotSources {
            fix: Some(&f),
            sog: Some(4.0),
            apparent_wind: Some(ApparentWind { speed: 12.0, angle: 40.0 }),
            true_wind: Some(TrueWind { speed: 9.0, angle: 55.0, direction: None }),
            link_quality: Some(-61),
            ..Default::default()
        };
        let snap = assembler.assemble(3.0, &sources);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["SOG"], 4.0);
        assert_eq!(json["AWS"], 12.0);
        assert_eq!(json["TWA"], 55.0);
        assert!(json["TWD"].is_null());
        assert!(json["HDM"].is_null());
        assert_eq!(json["rssi"], -61);
        assert_eq!(json["COG"], 212.0);
    }

    #[test]
    fn test_sequence_increments() {
        let mut assembler = SnapshotAssembler::new();
        let a = assembler.assemble(0.0, &SnapshotSources::default());
        let b = assembler.assemble(0.1, &SnapshotSources::default());
        assert_eq!(b.seq, a.seq + 1);
    }
}
