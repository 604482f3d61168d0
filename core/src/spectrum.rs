//! Band power estimation
//!
//! A waveform is reduced to the mean periodogram power (in dB) inside each
//! band of a [`BandSet`]. The periodogram mirrors the classic
//! "spectrum"-scaled estimator: Hamming window over the whole input, truncate
//! or zero-pad to the FFT length, remove the mean, one-sided power.

use realfft::RealFftPlanner;

use crate::bands::BandSet;
use crate::error::{Result, TvoError};
use crate::FFT_LEN;

/// Mean dB power per band, in band order.
#[derive(Debug, Clone, PartialEq)]
pub struct BandPowerProfile {
    values: Vec<f64>,
}

impl BandPowerProfile {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Periodic Hamming window (the DFT-even form used for spectral analysis).
pub fn hamming_window(len: usize) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    let n = len as f64;
    (0..len)
        .map(|i| 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / n).cos())
        .collect()
}

/// One-sided periodogram with power ("spectrum") scaling.
///
/// Returns `fft_len / 2 + 1` bins; bin `k` sits at `k * sample_rate / fft_len`.
/// Input longer than `fft_len` is truncated to its first `fft_len` samples.
pub fn periodogram(samples: &[f64], fft_len: usize) -> Result<Vec<f64>> {
    if samples.is_empty() {
        return Err(TvoError::InvalidInput("waveform is empty".into()));
    }
    if fft_len < 2 {
        return Err(TvoError::InvalidConfig(format!("FFT length {} is too short", fft_len)));
    }

    let used = samples.len().min(fft_len);
    let mean = samples[..used].iter().sum::<f64>() / used as f64;

    let mut buffer = vec![0.0; fft_len];
    for (dst, &src) in buffer.iter_mut().zip(samples[..used].iter()) {
        *dst = src - mean;
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(fft_len);
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut buffer, &mut spectrum)
        .map_err(|e| TvoError::FftError(format!("periodogram FFT failed: {:?}", e)))?;

    let scale = 1.0 / (used as f64 * used as f64);
    let mut power: Vec<f64> = spectrum.iter().map(|c| c.norm_sqr() * scale).collect();

    // Fold negative frequencies; DC (and Nyquist for even lengths) appear once
    let last = power.len() - 1;
    let doubled_end = if fft_len % 2 == 0 { last } else { last + 1 };
    for p in power.iter_mut().take(doubled_end).skip(1) {
        *p *= 2.0;
    }

    Ok(power)
}

/// Computes [`BandPowerProfile`]s for a fixed band set and FFT length.
#[derive(Debug, Clone)]
pub struct BandPowerSpectrum {
    bands: BandSet,
    fft_len: usize,
}

impl BandPowerSpectrum {
    pub fn new(bands: BandSet, fft_len: usize) -> Result<Self> {
        if fft_len < 2 {
            return Err(TvoError::InvalidConfig(format!("FFT length {} is too short", fft_len)));
        }
        Ok(Self { bands, fft_len })
    }

    pub fn bands(&self) -> &BandSet {
        &self.bands
    }

    pub fn fft_len(&self) -> usize {
        self.fft_len
    }

    /// Fails with `InvalidConfig` when some band falls between bins or above
    /// Nyquist at `sample_rate`. Needs no signal, so callers can check a band
    /// set before the first trial.
    pub fn check_resolution(&self, sample_rate: f64) -> Result<()> {
        check_sample_rate(sample_rate)?;
        let bin_hz = sample_rate / self.fft_len as f64;
        let bins = self.fft_len / 2 + 1;
        for (idx, band) in self.bands.iter().enumerate() {
            if !(0..bins).any(|k| band.contains(k as f64 * bin_hz)) {
                return Err(self.empty_band(idx, sample_rate));
            }
        }
        Ok(())
    }

    fn empty_band(&self, idx: usize, sample_rate: f64) -> TvoError {
        let band = &self.bands.bands()[idx];
        TvoError::InvalidConfig(format!(
            "band {} [{}, {}] Hz selects no bins at {} Hz / {}-point FFT",
            idx, band.low_hz, band.high_hz, sample_rate, self.fft_len
        ))
    }

    pub fn profile(&self, samples: &[f64], sample_rate: f64) -> Result<BandPowerProfile> {
        if samples.is_empty() {
            return Err(TvoError::InvalidInput("waveform is empty".into()));
        }
        check_sample_rate(sample_rate)?;

        let windowed: Vec<f64> = samples
            .iter()
            .zip(hamming_window(samples.len()))
            .map(|(&s, w)| s * w)
            .collect();
        let power = periodogram(&windowed, self.fft_len)?;
        let bin_hz = sample_rate / self.fft_len as f64;

        let mut values = Vec::with_capacity(self.bands.len());
        for (idx, band) in self.bands.iter().enumerate() {
            let (sum, count) = power
                .iter()
                .enumerate()
                .filter(|(k, _)| band.contains(*k as f64 * bin_hz))
                .fold((0.0, 0usize), |(sum, count), (_, &p)| (sum + p, count + 1));

            if count == 0 {
                return Err(self.empty_band(idx, sample_rate));
            }

            let db = 10.0 * (sum / count as f64).log10();
            if !db.is_finite() {
                return Err(TvoError::InvalidInput(format!(
                    "band {} [{}, {}] Hz has no measurable power",
                    idx, band.low_hz, band.high_hz
                )));
            }
            values.push(db);
        }

        Ok(BandPowerProfile::new(values))
    }
}

fn check_sample_rate(sample_rate: f64) -> Result<()> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(TvoError::InvalidInput(format!("invalid sample rate {}", sample_rate)))
    }
}

impl Default for BandPowerSpectrum {
    fn default() -> Self {
        Self {
            bands: BandSet::default(),
            fft_len: FFT_LEN,
        }
    }
}
