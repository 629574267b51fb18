//! Apparent to true wind.
//!
//! Apparent wind is what the masthead sensor feels: true wind plus the
//! headwind the boat makes by moving. Removing the boat's own velocity gives
//! true wind relative to the bow; rotating that by the heading gives the
//! compass direction the wind blows from.

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

use crate::geodesy::normalize_degrees;
use crate::types::RawWind;

/// Reference frame for the reported true wind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindFrame {
    /// Bow-relative TWS/TWA plus compass TWD
    World,
    /// Bow-relative TWS/TWA only
    Vessel,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApparentWind {
    /// Knots
    pub speed: f64,
    /// Degrees clockwise from the bow, [0, 360)
    pub angle: f64,
}

impl ApparentWind {
    pub fn from_raw(raw: &RawWind, ms_to_knots: f64) -> Self {
        Self {
            speed: raw.speed_ms * ms_to_knots,
            angle: normalize_degrees(raw.direction as f64),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrueWind {
    /// Knots, never negative
    pub speed: f64,
    /// Whole degrees clockwise from the bow
    pub angle: f64,
    /// Whole degrees from north the wind blows from. Only in the world frame
    /// with a known heading.
    pub direction: Option<f64>,
}

/// True wind from apparent wind, boat speed (knots) and optional heading.
///
/// Below `min_boat_speed` the boat is treated as drifting and true wind is
/// apparent wind, unchanged.
pub fn true_wind(
    apparent: &ApparentWind,
    boat_speed: f64,
    heading: Option<f64>,
    frame: WindFrame,
    min_boat_speed: f64,
) -> TrueWind {
    let heading = match frame {
        WindFrame::World => heading,
        WindFrame::Vessel => None,
    };

    if !(boat_speed >= min_boat_speed) {
        return TrueWind {
            speed: apparent.speed,
            angle: apparent.angle,
            direction: heading.map(|h| normalize_degrees((apparent.angle + h).round()) % 360.0),
        };
    }

    let awa = apparent.angle.to_radians();
    // x: starboard, y: forward
    let bow_relative = Vector2::new(apparent.speed * awa.sin(), apparent.speed * awa.cos() - boat_speed);

    let speed = bow_relative.norm().max(0.0);
    let angle = whole_degrees(bow_relative.x.atan2(bow_relative.y).to_degrees());

    let direction = heading.map(|h| {
        // Clockwise by the heading in compass terms is counter-clockwise in
        // (x east, y north) maths convention
        let world = Rotation2::new(-h.to_radians()) * bow_relative;
        whole_degrees(world.x.atan2(world.y).to_degrees())
    });

    TrueWind { speed, angle, direction }
}

fn whole_degrees(angle: f64) -> f64 {
    normalize_degrees(angle.round()) % 360.0
}
