//! Sensor fusion pipeline for a sailing instrument.
//!
//! GPS fixes, IMU reports and anemometer readings go in once per update tick,
//! a [`snapshot::NavigationSnapshot`] comes out. Transport, persistence and UI
//! live outside this crate and talk to it through [`pipeline::NavPipeline`].

pub mod calibration;
pub mod command;
pub mod config;
pub mod error;
pub mod geodesy;
pub mod gps_source;
pub mod health;
pub mod movement;
pub mod orientation;
pub mod pipeline;
pub mod ring_buffer;
pub mod snapshot;
pub mod speed_filter;
pub mod stats;
pub mod types;
pub mod wind;
pub mod wind_sensor;

pub use config::{NavConfig, SensorPresence};
pub use error::{NavError, NavResult};
pub use pipeline::{NavEvent, NavPipeline};
pub use snapshot::NavigationSnapshot;
