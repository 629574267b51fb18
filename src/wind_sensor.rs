// wind_sensor.rs — Ultrasonic anemometer over an RS485 register bus
//
// Two sensor families share the same bus address but lay out their holding
// registers differently and talk at different serial settings. The sensor
// never says which one it is, so the reader guesses: try one layout, and if
// the reading fails or decodes to nonsense, reconfigure and try the other.
// The first plausible reading locks the layout for the rest of the session.

use thiserror::Error;

use crate::types::RawWind;

/// Bus-level and decode failures of one wind read.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum WindReadError {
    #[error("read attempted too soon after the previous one")]
    RateLimited,

    #[error("invalid slave id")]
    InvalidSlaveId,

    #[error("invalid function")]
    InvalidFunction,

    #[error("response timeout")]
    Timeout,

    #[error("invalid CRC")]
    InvalidCrc,

    #[error("bus error code {0:#04x}")]
    Other(u8),

    #[error("response too short: got {got} registers, need {need}")]
    ShortResponse { got: usize, need: usize },

    #[error("implausible reading: {speed_ms:.2} m/s at {direction}°")]
    Implausible { speed_ms: f64, direction: i32 },
}

impl WindReadError {
    /// Map a Modbus master status code.
    pub fn from_modbus_code(code: u8) -> Self {
        match code {
            0xE0 => WindReadError::InvalidSlaveId,
            0xE1 => WindReadError::InvalidFunction,
            0xE2 => WindReadError::Timeout,
            0xE3 => WindReadError::InvalidCrc,
            other => WindReadError::Other(other),
        }
    }

    /// Failures that say something about the sensor, as opposed to the
    /// caller polling too fast.
    pub fn is_failure(&self) -> bool {
        !matches!(self, WindReadError::RateLimited)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud: u32,
    /// Data bits, parity, stop bits, e.g. "8E1"
    pub framing: &'static str,
}

/// Holding-register layout of the attached sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterFormat {
    /// reg0 direction, reg1/reg2 speed as an IEEE-754 float (low word first)
    Ieee754Float,
    /// reg0 speed × 100, reg1 direction
    ScaledInteger,
}

impl RegisterFormat {
    pub fn start_register(self) -> u16 {
        match self {
            RegisterFormat::Ieee754Float => 0x0001,
            RegisterFormat::ScaledInteger => 0x0000,
        }
    }

    pub fn register_count(self) -> u16 {
        match self {
            RegisterFormat::Ieee754Float => 4,
            RegisterFormat::ScaledInteger => 2,
        }
    }

    pub fn serial_settings(self) -> SerialSettings {
        match self {
            RegisterFormat::Ieee754Float => SerialSettings { baud: 9600, framing: "8E1" },
            RegisterFormat::ScaledInteger => SerialSettings { baud: 4800, framing: "8N1" },
        }
    }

    pub fn other(self) -> Self {
        match self {
            RegisterFormat::Ieee754Float => RegisterFormat::ScaledInteger,
            RegisterFormat::ScaledInteger => RegisterFormat::Ieee754Float,
        }
    }

    pub fn decode(self, regs: &[u16]) -> Result<RawWind, WindReadError> {
        let need = match self {
            RegisterFormat::Ieee754Float => 3,
            RegisterFormat::ScaledInteger => 2,
        };
        if regs.len() < need {
            return Err(WindReadError::ShortResponse { got: regs.len(), need });
        }
        Ok(match self {
            RegisterFormat::Ieee754Float => RawWind {
                speed_ms: f32::from_bits(((regs[2] as u32) << 16) | regs[1] as u32) as f64,
                direction: regs[0] as i32,
            },
            RegisterFormat::ScaledInteger => RawWind {
                speed_ms: regs[0] as f64 / 100.0,
                direction: regs[1] as i32,
            },
        })
    }
}

/// Where the reader is in working out the sensor's register layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionState {
    Undetected { trying: RegisterFormat },
    Locked(RegisterFormat),
}

impl DetectionState {
    pub fn format(self) -> RegisterFormat {
        match self {
            DetectionState::Undetected { trying } => trying,
            DetectionState::Locked(format) => format,
        }
    }

    pub fn is_locked(self) -> bool {
        matches!(self, DetectionState::Locked(_))
    }
}

/// Register-level access to the anemometer. Implemented by the RS485
/// transport on hardware and by scripted mocks in tests.
pub trait RegisterBus {
    fn read_holding_registers(&mut self, start: u16, count: u16) -> Result<Vec<u16>, WindReadError>;

    /// Reopen the line with new baud rate and framing.
    fn reconfigure(&mut self, settings: SerialSettings) -> Result<(), WindReadError>;
}

/// Plausibility bounds for a decoded reading. These are field experience,
/// not datasheet limits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindLimits {
    pub max_speed_ms: f64,
    pub max_direction: i32,
}

impl Default for WindLimits {
    fn default() -> Self {
        Self { max_speed_ms: 50.0, max_direction: 359 }
    }
}

impl WindLimits {
    pub fn is_plausible(&self, raw: &RawWind) -> bool {
        (0..=self.max_direction).contains(&raw.direction)
            && raw.speed_ms.is_finite()
            && (0.0..=self.max_speed_ms).contains(&raw.speed_ms)
    }
}

const MIN_ATTEMPT_SPACING_SECS: f64 = 0.1;

pub struct WindSensor<B: RegisterBus> {
    bus: B,
    state: DetectionState,
    limits: WindLimits,
    last_attempt: Option<f64>,
}

impl<B: RegisterBus> WindSensor<B> {
    /// Starts out trying the float layout. The bus is assumed to be
    /// configured for it already.
    pub fn new(bus: B) -> Self {
        Self::with_limits(bus, WindLimits::default())
    }

    pub fn with_limits(bus: B, limits: WindLimits) -> Self {
        Self {
            bus,
            state: DetectionState::Undetected { trying: RegisterFormat::Ieee754Float },
            limits,
            last_attempt: None,
        }
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// One read attempt. Never blocks longer than the bus timeout.
    pub fn poll(&mut self, now: f64) -> Result<RawWind, WindReadError> {
        if let Some(last) = self.last_attempt {
            if now - last < MIN_ATTEMPT_SPACING_SECS {
                return Err(WindReadError::RateLimited);
            }
        }
        self.last_attempt = Some(now);

        let format = self.state.format();
        let result = self
            .bus
            .read_holding_registers(format.start_register(), format.register_count())
            .and_then(|regs| format.decode(&regs))
            .and_then(|raw| {
                if self.limits.is_plausible(&raw) {
                    Ok(raw)
                } else {
                    Err(WindReadError::Implausible { speed_ms: raw.speed_ms, direction: raw.direction })
                }
            });

        match (&result, self.state) {
            (Ok(_), DetectionState::Undetected { trying }) => {
                log::info!("Wind sensor format detected and locked: {:?}", trying);
                self.state = DetectionState::Locked(trying);
            }
            (Err(e), DetectionState::Undetected { trying }) => {
                let next = trying.other();
                log::debug!("Wind read with {:?} failed ({}), trying {:?}", trying, e, next);
                let settings = next.serial_settings();
                if let Err(bus_err) = self.bus.reconfigure(settings) {
                    log::warn!(
                        "Failed to reconfigure wind bus to {} {}: {}",
                        settings.baud, settings.framing, bus_err
                    );
                }
                self.state = DetectionState::Undetected { trying: next };
            }
            _ => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Answers reads from a script and records every call.
    #[derive(Default)]
    struct ScriptedBus {
        responses: VecDeque<Result<Vec<u16>, WindReadError>>,
        reads: Vec<(u16, u16)>,
        reconfigured: Vec<SerialSettings>,
    }

    impl ScriptedBus {
        fn with(responses: Vec<Result<Vec<u16>, WindReadError>>) -> Self {
            Self { responses: responses.into(), ..Default::default() }
        }
    }

    impl RegisterBus for ScriptedBus {
        fn read_holding_registers(&mut self, start: u16, count: u16) -> Result<Vec<u16>, WindReadError> {
            self.reads.push((start, count));
            self.responses.pop_front().unwrap_or(Err(WindReadError::Timeout))
        }

        fn reconfigure(&mut self, settings: SerialSettings) -> Result<(), WindReadError> {
            self.reconfigured.push(settings);
            Ok(())
        }
    }

    fn float_regs(direction: u16, speed: f32) -> Vec<u16> {
        let bits = speed.to_bits();
        vec![direction, (bits & 0xFFFF) as u16, (bits >> 16) as u16, 0]
    }

    #[test]
    fn test_decode_float_layout() {
        let raw = RegisterFormat::Ieee754Float.decode(&float_regs(270, 6.5)).unwrap();
        assert_eq!(raw, RawWind { speed_ms: 6.5, direction: 270 });
    }

    #[test]
    fn test_decode_scaled_layout() {
        let raw = RegisterFormat::ScaledInteger.decode(&[125, 42]).unwrap();
        assert_eq!(raw, RawWind { speed_ms: 1.25, direction: 42 });
    }

    #[test]
    fn test_short_response() {
        let err = RegisterFormat::ScaledInteger.decode(&[125]).unwrap_err();
        assert_eq!(err, WindReadError::ShortResponse { got: 1, need: 2 });
    }

    #[test]
    fn test_modbus_codes() {
        assert_eq!(WindReadError::from_modbus_code(0xE0), WindReadError::InvalidSlaveId);
        assert_eq!(WindReadError::from_modbus_code(0xE2), WindReadError::Timeout);
        assert_eq!(WindReadError::from_modbus_code(0xE3), WindReadError::InvalidCrc);
        assert_eq!(WindReadError::from_modbus_code(0x05), WindReadError::Other(0x05));
    }

    #[test]
    fn test_locks_float_sensor_on_first_good_read() {
        let mut sensor = WindSensor::new(ScriptedBus::with(vec![Ok(float_regs(90, 4.0))]));
        let raw = sensor.poll(0.0).unwrap();
        assert_eq!(raw.direction, 90);
        assert_eq!(sensor.state(), DetectionState::Locked(RegisterFormat::Ieee754Float));
        assert_eq!(sensor.bus_mut().reads, vec![(0x0001, 4)]);
    }

    #[test]
    fn test_falls_back_to_scaled_after_garbage() {
        // A scaled-integer sensor answering the float request decodes to nonsense
        let bus = ScriptedBus::with(vec![Ok(vec![812, 4000, 17000, 0]), Ok(vec![812, 200])]);
        let mut sensor = WindSensor::new(bus);

        let err = sensor.poll(0.0).unwrap_err();
        assert!(matches!(err, WindReadError::Implausible { .. }));
        assert_eq!(sensor.state(), DetectionState::Undetected { trying: RegisterFormat::ScaledInteger });
        assert_eq!(sensor.bus_mut().reconfigured, vec![SerialSettings { baud: 4800, framing: "8N1" }]);

        let raw = sensor.poll(0.2).unwrap();
        assert_eq!(raw, RawWind { speed_ms: 8.12, direction: 200 });
        assert_eq!(sensor.state(), DetectionState::Locked(RegisterFormat::ScaledInteger));
        assert_eq!(sensor.bus_mut().reads, vec![(0x0001, 4), (0x0000, 2)]);
    }

    #[test]
    fn test_toggles_on_bus_error_while_undetected() {
        let bus = ScriptedBus::with(vec![Err(WindReadError::Timeout), Err(WindReadError::Timeout)]);
        let mut sensor = WindSensor::new(bus);
        assert_eq!(sensor.poll(0.0), Err(WindReadError::Timeout));
        assert_eq!(sensor.state().format(), RegisterFormat::ScaledInteger);
        assert_eq!(sensor.poll(0.1), Err(WindReadError::Timeout));
        assert_eq!(sensor.state().format(), RegisterFormat::Ieee754Float);
        assert!(!sensor.state().is_locked());
        assert_eq!(
            sensor.bus_mut().reconfigured,
            vec![
                SerialSettings { baud: 4800, framing: "8N1" },
                SerialSettings { baud: 9600, framing: "8E1" },
            ]
        );
    }

    #[test]
    fn test_locked_format_survives_errors() {
        let bus = ScriptedBus::with(vec![
            Ok(vec![500, 10]),
            Err(WindReadError::InvalidCrc),
            Ok(vec![9000, 10]),
            Ok(vec![510, 12]),
        ]);
        let mut sensor = WindSensor::new(bus);
        // First attempt goes to the float layout and times out on the script
        sensor.bus_mut().responses.push_front(Err(WindReadError::Timeout));

        assert!(sensor.poll(0.0).is_err());
        assert_eq!(sensor.poll(0.5).unwrap().speed_ms, 5.0);
        assert!(sensor.state().is_locked());

        assert_eq!(sensor.poll(1.0), Err(WindReadError::InvalidCrc));
        assert!(matches!(sensor.poll(1.5), Err(WindReadError::Implausible { .. })));
        assert_eq!(sensor.state(), DetectionState::Locked(RegisterFormat::ScaledInteger));
        assert_eq!(sensor.poll(2.0).unwrap().direction, 12);
        assert_eq!(sensor.bus_mut().reconfigured.len(), 1);
    }

    #[test]
    fn test_attempt_spacing() {
        let bus = ScriptedBus::with(vec![Ok(vec![300, 90]), Ok(vec![310, 91])]);
        let mut sensor = WindSensor::new(bus);
        sensor.bus_mut().responses.push_front(Err(WindReadError::Timeout));
        assert!(sensor.poll(0.0).is_err());
        assert_eq!(sensor.poll(0.05), Err(WindReadError::RateLimited));
        assert!(!WindReadError::RateLimited.is_failure());
        assert_eq!(sensor.bus_mut().reads.len(), 1);
        assert!(sensor.poll(0.1).is_ok());
    }
}
