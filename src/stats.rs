use serde::Serialize;

use crate::snapshot::NavigationSnapshot;

/// Running session figures shown on the companion display.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionStats {
    /// Highest true wind speed seen, knots
    pub tws_max: f64,
    /// Mean true wind speed over every snapshot that had one
    pub tws_avg: f64,
    pub tws_samples: u64,
    /// Largest heel to port, as a positive angle
    pub heel_port_max: f64,
    /// Largest heel to starboard
    pub heel_starboard_max: f64,
}

impl SessionStats {
    pub fn update(&mut self, snapshot: &NavigationSnapshot) {
        if snapshot.tws.is_finite() {
            self.tws_samples += 1;
            self.tws_max = self.tws_max.max(snapshot.tws);
            self.tws_avg += (snapshot.tws - self.tws_avg) / self.tws_samples as f64;
        }
        if snapshot.heel.is_finite() {
            if snapshot.heel < 0.0 {
                self.heel_port_max = self.heel_port_max.max(-snapshot.heel);
            } else {
                self.heel_starboard_max = self.heel_starboard_max.max(snapshot.heel);
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
