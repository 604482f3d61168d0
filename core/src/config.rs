use serde::{Deserialize, Serialize};

use crate::bands::BandSet;
use crate::error::{Result, TvoError};
use crate::slope::XAxis;
use crate::{
    DEFAULT_DITHER_STD, DEFAULT_GRID_POINTS, DEFAULT_LOWER_DB, DEFAULT_MAX_VOLUMES,
    DEFAULT_TOLERANCE_DB, DEFAULT_TRIALS, DEFAULT_UPPER_DB, FFT_LEN,
};

/// Settings for the frequency slope fit scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub bands: BandSet,
    pub fft_len: usize,
    pub x_axis: XAxis,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            bands: BandSet::default(),
            fft_len: FFT_LEN,
            x_axis: XAxis::default(),
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fft_len < 2 {
            return Err(TvoError::InvalidConfig(format!(
                "fft_len must be at least 2, got {}",
                self.fft_len
            )));
        }
        Ok(())
    }
}

/// Settings for one calibration run.
///
/// Every field has a default, so partial JSON documents deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Lower edge of the starting search interval (dB)
    pub lower_db: f64,
    /// Upper edge of the starting search interval (dB)
    pub upper_db: f64,
    /// Number of volumes in the initial grid
    pub points: usize,
    /// Search stops once the grid spacing falls below this (dB)
    pub tolerance_db: f64,
    /// Trials run at each visited volume
    pub trials: usize,
    /// Maximum number of volumes visited in a run
    pub max_volumes: usize,
    /// Standard deviation of the Gaussian dither added to every score
    pub dither_std: f64,
    /// Explicit volumes to evaluate instead of searching
    pub volumes: Vec<f64>,
    /// Seed for the dither generator; entropy when absent
    pub seed: Option<u64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            lower_db: DEFAULT_LOWER_DB,
            upper_db: DEFAULT_UPPER_DB,
            points: DEFAULT_GRID_POINTS,
            tolerance_db: DEFAULT_TOLERANCE_DB,
            trials: DEFAULT_TRIALS,
            max_volumes: DEFAULT_MAX_VOLUMES,
            dither_std: DEFAULT_DITHER_STD,
            volumes: Vec::new(),
            seed: None,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.lower_db.is_finite() && self.upper_db.is_finite()) || self.lower_db >= self.upper_db {
            return Err(TvoError::InvalidConfig(format!(
                "search interval [{}, {}] dB must be finite and increasing",
                self.lower_db, self.upper_db
            )));
        }
        if self.points < 2 {
            return Err(TvoError::InvalidConfig(format!(
                "initial grid needs at least 2 points, got {}",
                self.points
            )));
        }
        if !(self.tolerance_db.is_finite() && self.tolerance_db > 0.0) {
            return Err(TvoError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance_db
            )));
        }
        if self.trials == 0 {
            return Err(TvoError::InvalidConfig("trials must be at least 1".into()));
        }
        if self.max_volumes == 0 {
            return Err(TvoError::InvalidConfig("max_volumes must be at least 1".into()));
        }
        if !(self.dither_std.is_finite() && self.dither_std >= 0.0) {
            return Err(TvoError::InvalidConfig(format!(
                "dither_std must be non-negative, got {}",
                self.dither_std
            )));
        }
        if let Some(v) = self.volumes.iter().find(|v| !v.is_finite()) {
            return Err(TvoError::InvalidConfig(format!("volume {} is not finite", v)));
        }
        Ok(())
    }
}
