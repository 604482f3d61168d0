//! Frequency slope fit (FSF) distortion scoring
//!
//! The receive capture is aligned to the transmit clip, both are reduced to
//! band power profiles, and the ratio of their roll-off slopes is the score.
//! A clean channel scores 1.0; clipping flattens the roll-off and pushes the
//! score away from 1.0.

use log::warn;

use crate::config::ScorerConfig;
use crate::delay::{CorrelationDelayEstimator, DelayEstimator};
use crate::error::{Result, TvoError};
use crate::slope::{SlopeFit, SlopeFitEngine};
use crate::spectrum::BandPowerSpectrum;

/// Anomalies that degrade a score without invalidating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreWarning {
    /// Receive capture appeared to lead the transmit clip; delay clamped to 0
    NegativeDelay { estimated: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub score: f64,
    /// Delay applied when trimming the receive capture
    pub delay_samples: usize,
    /// Mouth-to-ear latency in seconds
    pub latency_s: f64,
    pub tx_fit: SlopeFit,
    pub rx_fit: SlopeFit,
    pub warnings: Vec<ScoreWarning>,
}

pub struct DistortionScorer<D = CorrelationDelayEstimator> {
    spectrum: BandPowerSpectrum,
    fit_engine: SlopeFitEngine,
    delay: D,
}

impl DistortionScorer<CorrelationDelayEstimator> {
    pub fn new(config: &ScorerConfig) -> Result<Self> {
        Self::with_delay_estimator(config, CorrelationDelayEstimator)
    }
}

impl Default for DistortionScorer<CorrelationDelayEstimator> {
    fn default() -> Self {
        Self {
            spectrum: BandPowerSpectrum::default(),
            fit_engine: SlopeFitEngine::new(&ScorerConfig::default().bands, Default::default()),
            delay: CorrelationDelayEstimator,
        }
    }
}

impl<D: DelayEstimator> DistortionScorer<D> {
    pub fn with_delay_estimator(config: &ScorerConfig, delay: D) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            spectrum: BandPowerSpectrum::new(config.bands.clone(), config.fft_len)?,
            fit_engine: SlopeFitEngine::new(&config.bands, config.x_axis),
            delay,
        })
    }

    /// Checks that every band resolves to at least one FFT bin at `sample_rate`.
    pub fn check_sample_rate(&self, sample_rate: f64) -> Result<()> {
        self.spectrum.check_resolution(sample_rate)
    }

    /// Roll-off fit of a single waveform.
    pub fn slope_of(&self, samples: &[f64], sample_rate: f64) -> Result<SlopeFit> {
        let profile = self.spectrum.profile(samples, sample_rate)?;
        self.fit_engine.fit(&profile)
    }

    pub fn score(&self, tx: &[f64], rx: &[f64], sample_rate: f64) -> Result<f64> {
        self.evaluate(tx, rx, sample_rate).map(|report| report.score)
    }

    pub fn evaluate(&self, tx: &[f64], rx: &[f64], sample_rate: f64) -> Result<ScoreReport> {
        if tx.is_empty() || rx.is_empty() {
            return Err(TvoError::InvalidInput(format!(
                "cannot score tx of {} and rx of {} samples",
                tx.len(),
                rx.len()
            )));
        }

        let mut warnings = Vec::new();
        let estimated = self.delay.estimate_delay(rx, tx, sample_rate)?;
        let delay = if estimated < 0 {
            warn!("Negative delay of {} samples detected, using zero", estimated);
            warnings.push(ScoreWarning::NegativeDelay { estimated });
            0
        } else {
            estimated as usize
        };

        let rx_aligned = align_receive(rx, tx.len(), delay);

        let tx_fit = self.slope_of(tx, sample_rate)?;
        let rx_fit = self.slope_of(rx_aligned, sample_rate)?;

        if tx_fit.slope == 0.0 {
            return Err(TvoError::ZeroReferenceSlope);
        }

        Ok(ScoreReport {
            score: rx_fit.slope / tx_fit.slope,
            delay_samples: delay,
            latency_s: delay as f64 / sample_rate,
            tx_fit,
            rx_fit,
            warnings,
        })
    }
}

/// Receive samples starting at `delay`, at most `tx_len` long.
///
/// Returns whatever remains when the capture is too short, and an empty
/// slice when the delay runs past the end.
pub fn align_receive(rx: &[f64], tx_len: usize, delay: usize) -> &[f64] {
    let start = delay.min(rx.len());
    let end = delay.saturating_add(tx_len).min(rx.len());
    &rx[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::{BandSet, FrequencyBand};
    use crate::delay::FixedDelay;
    use crate::SAMPLE_RATE;
    use std::f64::consts::PI;

    fn voiced(len: usize) -> Vec<f64> {
        let mut state = 12345u64;
        (0..len)
            .map(|n| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let noise = ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5;
                let t = n as f64 / SAMPLE_RATE;
                let voiced: f64 = (1..=20)
                    .map(|h| (2.0 * PI * 140.0 * h as f64 * t).sin() / (h * h) as f64)
                    .sum();
                0.2 * voiced + 0.01 * noise
            })
            .collect()
    }

    #[test]
    fn align_receive_trims() {
        let rx: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(align_receive(&rx, 4, 2), &[2.0, 3.0, 4.0, 5.0]);
        assert_eq!(align_receive(&rx, 8, 5), &[5.0, 6.0, 7.0, 8.0, 9.0]);
        assert!(align_receive(&rx, 4, 20).is_empty());
    }

    #[test]
    fn identical_waveforms_score_one() {
        let clip = voiced(24_000);
        let scorer = DistortionScorer::default();
        let report = scorer.evaluate(&clip, &clip, SAMPLE_RATE).unwrap();

        assert_eq!(report.delay_samples, 0);
        assert!((report.score - 1.0).abs() < 1e-12, "score {}", report.score);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn negative_delay_is_clamped_with_warning() {
        let clip = voiced(24_000);
        let scorer = DistortionScorer::with_delay_estimator(&ScorerConfig::default(), FixedDelay(-37)).unwrap();
        let report = scorer.evaluate(&clip, &clip, SAMPLE_RATE).unwrap();

        assert_eq!(report.delay_samples, 0);
        assert_eq!(report.warnings, vec![ScoreWarning::NegativeDelay { estimated: -37 }]);
        assert!((report.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn latency_follows_delay() {
        let clip = voiced(24_000);
        let mut rx = vec![0.0; 480];
        rx.extend_from_slice(&clip);
        let scorer = DistortionScorer::with_delay_estimator(&ScorerConfig::default(), FixedDelay(480)).unwrap();
        let report = scorer.evaluate(&clip, &rx, SAMPLE_RATE).unwrap();

        assert_eq!(report.delay_samples, 480);
        assert!((report.latency_s - 0.01).abs() < 1e-12);
        assert!((report.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn clipping_changes_score() {
        let clip = voiced(24_000);
        let clipped: Vec<f64> = clip.iter().map(|s| (s * 20.0).clamp(-0.5, 0.5)).collect();
        let score = DistortionScorer::default().score(&clip, &clipped, SAMPLE_RATE).unwrap();
        assert!((score - 1.0).abs() > 0.05, "score {}", score);
    }

    #[test]
    fn delay_past_capture_is_invalid_input() {
        let clip = voiced(4_000);
        let scorer = DistortionScorer::with_delay_estimator(&ScorerConfig::default(), FixedDelay(10_000)).unwrap();
        assert!(matches!(scorer.evaluate(&clip, &clip, SAMPLE_RATE), Err(TvoError::InvalidInput(_))));
    }

    /// Band 2 repeats band 0, so any waveform gives powers `[a, b, a]` and
    /// the fit from pivot 0 over x = 0, 1, 2 is exactly flat.
    fn mirrored_bands() -> ScorerConfig {
        let band = FrequencyBand::new;
        ScorerConfig {
            bands: BandSet::new(vec![band(400.0, 650.0), band(1000.0, 1250.0), band(400.0, 650.0)]).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn flat_reference_slope_is_rejected() {
        let scorer = DistortionScorer::new(&mirrored_bands()).unwrap();
        let clip = voiced(24_000);

        let fit = scorer.slope_of(&clip, SAMPLE_RATE).unwrap();
        assert_eq!(fit.pivot_index, 0);
        assert_eq!(fit.slope, 0.0);
        let err = scorer.evaluate(&clip, &clip, SAMPLE_RATE).unwrap_err();
        assert!(matches!(err, TvoError::ZeroReferenceSlope));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn band_above_nyquist_fails_sample_rate_check() {
        let config = ScorerConfig {
            bands: BandSet::new(vec![FrequencyBand::new(200.0, 450.0), FrequencyBand::new(30_000.0, 31_000.0)])
                .unwrap(),
            ..Default::default()
        };
        let scorer = DistortionScorer::new(&config).unwrap();
        assert!(matches!(scorer.check_sample_rate(SAMPLE_RATE), Err(TvoError::InvalidConfig(_))));
        assert!(DistortionScorer::default().check_sample_rate(SAMPLE_RATE).is_ok());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(DistortionScorer::default().evaluate(&[], &[1.0], SAMPLE_RATE).is_err());
    }
}
