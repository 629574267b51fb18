//! Calibration offsets and the persistence port they are stored through.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NavError, NavResult};

/// User-captured zero points for heel and compass, in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    /// Roll reading that is treated as level
    pub heel_angle_delta: f64,
    /// Smoothed magnetic heading that is treated as north
    pub compass_offset_delta: f64,
}

/// Where calibration survives a reboot. The storage format is the
/// implementor's business.
pub trait CalibrationStore {
    fn load(&mut self) -> NavResult<Option<CalibrationState>>;
    fn save(&mut self, state: &CalibrationState) -> NavResult<()>;
}

/// Load at boot. A broken or empty store falls back to zero offsets.
pub fn load_or_default(store: &mut dyn CalibrationStore) -> CalibrationState {
    match store.load() {
        Ok(Some(state)) => {
            log::info!(
                "Calibration loaded: heel delta {:.2}°, compass offset {:.1}°",
                state.heel_angle_delta, state.compass_offset_delta
            );
            state
        }
        Ok(None) => {
            log::info!("No stored calibration, using zero offsets");
            CalibrationState::default()
        }
        Err(e) => {
            log::warn!("Failed to load calibration ({}), using zero offsets", e);
            CalibrationState::default()
        }
    }
}

/// Keeps calibration in memory only. Useful for tests and replay.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub stored: Option<CalibrationState>,
    pub save_count: u32,
}

impl CalibrationStore for MemoryStore {
    fn load(&mut self) -> NavResult<Option<CalibrationState>> {
        Ok(self.stored)
    }

    fn save(&mut self, state: &CalibrationState) -> NavResult<()> {
        self.stored = Some(*state);
        self.save_count += 1;
        Ok(())
    }
}

/// Calibration as a small JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationStore for JsonFileStore {
    fn load(&mut self) -> NavResult<Option<CalibrationState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&mut self, state: &CalibrationState) -> NavResult<()> {
        let json = serde_json::to_string_pretty(state)?;
        // Write-then-rename so a power cut never leaves half a file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path).map_err(|e| NavError::Storage(format!("{}: {}", self.path.display(), e)))
    }
}
