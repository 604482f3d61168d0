//! Transmit volume optimization for speech links
//!
//! Scores received speech by the roll-off of its band power spectrum (FSF)
//! and searches for the loudest playback volume whose scores stay on a
//! statistically flat plateau.

pub mod error;
pub mod config;
pub mod audio;
pub mod bands;
pub mod spectrum;
pub mod slope;
pub mod fft_correlation;
pub mod delay;
pub mod scorer;
pub mod stats;
pub mod cluster;
pub mod grid;
pub mod record;
pub mod controller;
pub mod simulate;

pub use bands::{BandSet, FrequencyBand};
pub use config::{CalibrationConfig, ScorerConfig};
pub use controller::{
    CalibrationController, CalibrationOutcome, CalibrationReport, Indicator, NoIndicator, NotFoundReason,
    OperatingPoint, TrialExecutor, TrialMeasurement,
};
pub use delay::{CorrelationDelayEstimator, DelayEstimator};
pub use error::{Result, TvoError};
pub use grid::{AdaptiveGridSearch, SearchInterval};
pub use scorer::{DistortionScorer, ScoreReport, ScoreWarning};
pub use simulate::{Clip, SimulatedChannel};
pub use slope::XAxis;
pub use stats::{ApproxPermutationTest, EquivalenceTest};

// Audio configuration
pub const SAMPLE_RATE: f64 = 48000.0; // Hz, rate all clips are scored at
pub const FFT_LEN: usize = 16384; // 2^14 periodogram length

// Search defaults
pub const DEFAULT_LOWER_DB: f64 = -40.0;
pub const DEFAULT_UPPER_DB: f64 = 0.0;
pub const DEFAULT_GRID_POINTS: usize = 10;
pub const DEFAULT_TOLERANCE_DB: f64 = 1.0;
pub const DEFAULT_TRIALS: usize = 40;
pub const DEFAULT_MAX_VOLUMES: usize = 30;
pub const DEFAULT_DITHER_STD: f64 = 0.5;

pub const OPTIMUM_FRACTION: f64 = 0.8; // optimum = lower + 0.8 * (upper - lower)
