use serde::{Deserialize, Serialize};

/// One decoded GPS fix as handed over by the GPS transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Speed over ground in knots
    pub speed: f64,
    /// Course over ground in degrees, absent when the receiver has none
    #[serde(default)]
    pub course: Option<f64>,
    pub satellites: u8,
    pub hdop: f64,
    pub valid: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub i: f64,
    pub j: f64,
    pub k: f64,
    pub real: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { i: 0.0, j: 0.0, k: 0.0, real: 1.0 };
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MagData {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Accelerometer vector in m/s²
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelData {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelData {
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// One IMU report. Each part is present only when the sensor flagged
/// "data available" for it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuReading {
    pub timestamp: f64,
    #[serde(default)]
    pub quaternion: Option<Quaternion>,
    #[serde(default)]
    pub mag: Option<MagData>,
    #[serde(default)]
    pub accel: Option<AccelData>,
}

/// Wind as read from the anemometer registers, before unit conversion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawWind {
    /// Apparent wind speed at the sensor, m/s
    pub speed_ms: f64,
    /// Apparent wind angle, degrees clockwise from the bow
    pub direction: i32,
}
