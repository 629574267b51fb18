//! NMEA byte stream to [`GpsFix`].
//!
//! Position, satellites and HDOP come from GGA, speed and course from RMC.
//! The decoder merges the two the way a receiver interleaves them and tags
//! each fix valid or not from how healthy the stream looks.

use nmea0183::{ParseResult, Parser};

use crate::types::GpsFix;

/// Bytes processed per call. The rest stays with the caller for the next tick.
pub const MAX_BYTES_PER_TICK: usize = 256;

/// A fix older than this is not valid any more.
const MAX_FIX_AGE_SECS: f64 = 5.0;
const MIN_BYTES_PROCESSED: u64 = 10;
const MIN_SATELLITES: u8 = 3;

/// Placeholder HDOP until a GGA sentence reports one.
const UNKNOWN_HDOP: f64 = 99.9;

#[derive(Debug, Clone, Copy, Default)]
struct FixState {
    latitude: Option<f64>,
    longitude: Option<f64>,
    satellites: Option<u8>,
    hdop: Option<f64>,
    speed_kn: Option<f64>,
    course: Option<f64>,
    /// When position was last refreshed
    fix_time: Option<f64>,
}

impl FixState {
    fn update_from_gga(&mut self, gga: &nmea0183::GGA, now: f64) {
        self.latitude = Some(gga.latitude.as_f64());
        self.longitude = Some(gga.longitude.as_f64());
        self.satellites = Some(gga.sat_in_use);
        self.hdop = Some(gga.hdop as f64);
        self.fix_time = Some(now);
    }

    fn update_from_rmc(&mut self, rmc: &nmea0183::RMC, now: f64) {
        self.latitude = Some(rmc.latitude.as_f64());
        self.longitude = Some(rmc.longitude.as_f64());
        self.speed_kn = Some(rmc.speed.as_knots() as f64);
        self.course = rmc.course.as_ref().map(|c| c.degrees as f64);
        self.fix_time = Some(now);
    }
}

/// Result of one [`NmeaFixDecoder::ingest`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    /// How many bytes of the input were consumed
    pub consumed: usize,
    /// Present when a sentence carrying fix data was completed
    pub fix: Option<GpsFix>,
}

pub struct NmeaFixDecoder {
    parser: Parser,
    state: FixState,
    bytes_processed: u64,
    sentences_with_fix: u32,
    failed_sentences: u32,
}

impl NmeaFixDecoder {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            state: FixState::default(),
            bytes_processed: 0,
            sentences_with_fix: 0,
            failed_sentences: 0,
        }
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    pub fn sentences_with_fix(&self) -> u32 {
        self.sentences_with_fix
    }

    pub fn failed_sentences(&self) -> u32 {
        self.failed_sentences
    }

    /// Feed up to [`MAX_BYTES_PER_TICK`] bytes of the serial stream.
    pub fn ingest(&mut self, bytes: &[u8], now: f64) -> Ingested {
        let consumed = bytes.len().min(MAX_BYTES_PER_TICK);
        let mut updated = false;

        for &byte in &bytes[..consumed] {
            self.bytes_processed += 1;
            match self.parser.parse_from_byte(byte) {
                Some(Ok(ParseResult::GGA(Some(gga)))) => {
                    self.state.update_from_gga(&gga, now);
                    self.sentences_with_fix += 1;
                    updated = true;
                }
                Some(Ok(ParseResult::RMC(Some(rmc)))) => {
                    self.state.update_from_rmc(&rmc, now);
                    self.sentences_with_fix += 1;
                    updated = true;
                }
                Some(Err(e)) => {
                    self.failed_sentences += 1;
                    log::debug!("NMEA sentence rejected: {}", e);
                }
                _ => {}
            }
        }

        let fix = if updated { self.current_fix(now) } else { None };
        Ingested { consumed, fix }
    }

    /// Latest merged fix, re-validated against `now`.
    pub fn current_fix(&self, now: f64) -> Option<GpsFix> {
        let (latitude, longitude) = (self.state.latitude?, self.state.longitude?);
        Some(GpsFix {
            timestamp: now,
            latitude,
            longitude,
            speed: self.state.speed_kn.unwrap_or(0.0),
            course: self.state.course,
            satellites: self.state.satellites.unwrap_or(0),
            hdop: self.state.hdop.unwrap_or(UNKNOWN_HDOP),
            valid: self.is_valid(now),
        })
    }

    /// Stream is alive, has produced a fix recently, and enough satellites
    /// are in use for it to mean something.
    pub fn is_valid(&self, now: f64) -> bool {
        let fresh = self.state.fix_time.is_some_and(|t| now - t < MAX_FIX_AGE_SECS);
        self.bytes_processed > MIN_BYTES_PROCESSED
            && self.sentences_with_fix > 0
            && self.state.latitude.is_some()
            && fresh
            && self.state.satellites.is_some_and(|s| s >= MIN_SATELLITES)
    }
}

impl Default for NmeaFixDecoder {
    fn default() -> Self {
        Self::new()
    }
}
