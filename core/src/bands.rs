use serde::{Deserialize, Serialize};

use crate::error::{Result, TvoError};

/// A frequency interval over which periodogram power is averaged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl FrequencyBand {
    pub const fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    pub fn center_hz(&self) -> f64 {
        (self.low_hz + self.high_hz) / 2.0
    }

    /// Inclusive on both edges.
    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.low_hz && freq_hz <= self.high_hz
    }
}

// Articulation-index style bands: 250 Hz wide, stepping 200 Hz
const AI_BANDS: [(f64, f64); 15] = [
    (200.0, 450.0),
    (400.0, 650.0),
    (600.0, 850.0),
    (800.0, 1050.0),
    (1000.0, 1250.0),
    (1200.0, 1450.0),
    (1400.0, 1650.0),
    (1600.0, 1850.0),
    (1800.0, 2050.0),
    (2000.0, 2250.0),
    (2200.0, 2450.0),
    (2400.0, 2650.0),
    (2600.0, 2850.0),
    (2800.0, 3050.0),
    (3000.0, 3250.0),
];

const MEL_BANDS: [(f64, f64); 27] = [
    (267.0, 400.0),
    (333.0, 467.0),
    (400.0, 533.0),
    (467.0, 600.0),
    (533.0, 667.0),
    (600.0, 733.0),
    (667.0, 800.0),
    (733.0, 867.0),
    (800.0, 933.0),
    (867.0, 999.0),
    (933.0, 1071.0),
    (999.0, 1147.0),
    (1071.0, 1229.0),
    (1147.0, 1316.0),
    (1229.0, 1410.0),
    (1316.0, 1510.0),
    (1410.0, 1618.0),
    (1510.0, 1733.0),
    (1618.0, 1856.0),
    (1733.0, 1988.0),
    (1856.0, 2130.0),
    (1988.0, 2281.0),
    (2130.0, 2444.0),
    (2281.0, 2618.0),
    (2444.0, 2804.0),
    (2618.0, 3004.0),
    (2804.0, 3217.0),
];

/// Ordered, non-empty set of (usually overlapping) frequency bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FrequencyBand>", into = "Vec<FrequencyBand>")]
pub struct BandSet {
    bands: Vec<FrequencyBand>,
}

impl BandSet {
    pub fn new(bands: Vec<FrequencyBand>) -> Result<Self> {
        if bands.is_empty() {
            return Err(TvoError::InvalidConfig("band set must not be empty".into()));
        }
        for (idx, band) in bands.iter().enumerate() {
            if !(band.low_hz.is_finite() && band.high_hz.is_finite())
                || band.low_hz < 0.0
                || band.low_hz >= band.high_hz
            {
                return Err(TvoError::InvalidConfig(format!(
                    "band {} has invalid edges [{}, {}] Hz",
                    idx, band.low_hz, band.high_hz
                )));
            }
        }
        Ok(Self { bands })
    }

    /// Default band set used by the scorer.
    pub fn ai() -> Self {
        Self::from_table(&AI_BANDS)
    }

    pub fn mel() -> Self {
        Self::from_table(&MEL_BANDS)
    }

    fn from_table(table: &[(f64, f64)]) -> Self {
        Self {
            bands: table.iter().map(|&(lo, hi)| FrequencyBand::new(lo, hi)).collect(),
        }
    }

    pub fn bands(&self) -> &[FrequencyBand] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrequencyBand> {
        self.bands.iter()
    }

    pub fn highest_hz(&self) -> f64 {
        self.bands.iter().map(|b| b.high_hz).fold(f64::MIN, f64::max)
    }
}

impl Default for BandSet {
    fn default() -> Self {
        Self::ai()
    }
}

impl TryFrom<Vec<FrequencyBand>> for BandSet {
    type Error = TvoError;

    fn try_from(bands: Vec<FrequencyBand>) -> Result<Self> {
        Self::new(bands)
    }
}

impl From<BandSet> for Vec<FrequencyBand> {
    fn from(set: BandSet) -> Self {
        set.bands
    }
}
