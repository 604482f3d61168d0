use serde::{Deserialize, Serialize};

use crate::bands::BandSet;
use crate::error::{Result, TvoError};
use crate::spectrum::BandPowerProfile;

/// What the band powers are regressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XAxis {
    /// Zero-based band number
    #[default]
    BandIndex,
    /// log10 of the band center frequency
    LogCenterFrequency,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeFit {
    pub slope: f64,
    pub intercept: f64,
    pub pivot_index: usize,
}

/// Fits the spectral roll-off of a [`BandPowerProfile`].
///
/// The fit starts at the strongest band of the lower half of the profile
/// (the speech formant region) and runs through the last band.
#[derive(Debug, Clone)]
pub struct SlopeFitEngine {
    x_values: Vec<f64>,
}

impl SlopeFitEngine {
    pub fn new(bands: &BandSet, x_axis: XAxis) -> Self {
        let x_values = match x_axis {
            XAxis::BandIndex => (0..bands.len()).map(|i| i as f64).collect(),
            XAxis::LogCenterFrequency => bands.iter().map(|b| b.center_hz().log10()).collect(),
        };
        Self { x_values }
    }

    pub fn fit(&self, profile: &BandPowerProfile) -> Result<SlopeFit> {
        let values = profile.values();
        if values.len() != self.x_values.len() {
            return Err(TvoError::InvalidInput(format!(
                "profile has {} bands, fit engine expects {}",
                values.len(),
                self.x_values.len()
            )));
        }

        let pivot_index = pivot_index(values);
        let points = values.len() - pivot_index;
        if points < 2 {
            return Err(TvoError::DegenerateFit { points });
        }

        let (slope, intercept) = least_squares(&self.x_values[pivot_index..], &values[pivot_index..])
            .ok_or(TvoError::DegenerateFit { points })?;
        Ok(SlopeFit {
            slope,
            intercept,
            pivot_index,
        })
    }
}

/// Index of the strongest band among the first half (at least one band).
/// The earliest index wins ties.
pub fn pivot_index(values: &[f64]) -> usize {
    let half = (values.len() / 2).max(1).min(values.len());
    let mut best = 0;
    for (idx, &v) in values.iter().enumerate().take(half) {
        if v > values[best] {
            best = idx;
        }
    }
    best
}

/// Ordinary least-squares line `y = slope * x + intercept`.
/// `None` when all x values coincide.
fn least_squares(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        sxy += dx * (yi - y_mean);
        sxx += dx * dx;
    }

    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, y_mean - slope * x_mean))
}
