use serde::{Deserialize, Serialize};

use crate::error::{NavError, NavResult};

/// Calibration commands sent by the companion app as
/// `{"action": "resetHeelAngle"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Take the current attitude as level
    ResetHeelAngle,
    /// Take the current heading as north
    ResetCompassOffset,
}

impl Command {
    pub fn parse(json: &str) -> NavResult<Command> {
        serde_json::from_str(json).map_err(|e| NavError::InvalidCommand(format!("{}: {}", json.trim(), e)))
    }
}
