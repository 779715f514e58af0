//! Point-confidence model: has the pointer come to rest?

use khameleon_core::PredictorConfig;
use serde::{Deserialize, Serialize};

/// Confidence that the user will act at the last observed position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointModel {
    #[serde(rename = "a")]
    pub alpha: f64,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
}

impl PointModel {
    /// Model for a pointer that has been still for `linger` milliseconds.
    ///
    /// Fully confident below `thresh_stop`, then decays linearly to
    /// `alpha_floor` at `max_stop`.
    pub fn from_linger(x: f64, y: f64, linger: f64, config: &PredictorConfig) -> Self {
        let span = config.max_stop - config.thresh_stop;
        let alpha = if linger < config.thresh_stop {
            1.0
        } else if span <= 0.0 {
            // no decay window: the floor applies as soon as the pointer stops
            config.alpha_floor
        } else {
            (1.0 - (linger - config.thresh_stop) / span).max(config.alpha_floor)
        };
        Self { alpha, x, y }
    }
}
