//! Sample conversion and level utilities for speech clips
//! Linear interpolation is used for resampling, which is adequate for the
//! band-limited speech the scorer looks at

use crate::error::{Result, TvoError};

/// Full scale of signed 16-bit PCM
const I16_SCALE: f64 = 32768.0;

/// Convert signed 16-bit PCM samples to floats in [-1, 1)
pub fn i16_to_f64(samples: &[i16]) -> Vec<f64> {
    samples.iter().map(|&s| s as f64 / I16_SCALE).collect()
}

/// Mix interleaved multi-channel audio to mono by averaging the channels
///
/// # Arguments
/// * `samples` - Interleaved samples [c0, c1, ..., c0, c1, ...]
/// * `channels` - Number of interleaved channels
///
/// # Errors
/// `InvalidInput` if `channels` is zero or the sample count is not a
/// multiple of it
pub fn to_mono(samples: &[f64], channels: usize) -> Result<Vec<f64>> {
    if channels == 0 {
        return Err(TvoError::InvalidInput("channel count must be at least 1".into()));
    }
    if samples.len() % channels != 0 {
        return Err(TvoError::InvalidInput(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            channels
        )));
    }
    if channels == 1 {
        return Ok(samples.to_vec());
    }

    Ok(samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f64>() / channels as f64)
        .collect())
}

/// Resample audio to a target sample rate using linear interpolation
///
/// # Arguments
/// * `samples` - Input audio samples
/// * `from_rate` - Current sample rate in Hz
/// * `to_rate` - Target sample rate in Hz
///
/// # Returns
/// Resampled audio at the target sample rate
pub fn resample_linear(samples: &[f64], from_rate: u32, to_rate: u32) -> Vec<f64> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_length = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;

    (0..new_length)
        .map(|i| {
            let src = i as f64 / ratio;
            let lo = (src.floor() as usize).min(samples.len() - 1);
            let hi = lo + 1;
            let fraction = src - lo as f64;
            if hi < samples.len() {
                samples[lo] * (1.0 - fraction) + samples[hi] * fraction
            } else {
                samples[lo]
            }
        })
        .collect()
}

/// Linear gain for playing at `volume_db` on a device set to `device_db`
pub fn db_to_gain(volume_db: f64, device_db: f64) -> f64 {
    10f64.powf((volume_db - device_db) / 20.0)
}

/// Scale a clip to a playback volume
pub fn scale_db(samples: &[f64], volume_db: f64, device_db: f64) -> Vec<f64> {
    let gain = db_to_gain(volume_db, device_db);
    samples.iter().map(|s| s * gain).collect()
}

/// Hard clip to the full-scale range [-1, 1], returning how many samples were clipped
pub fn hard_clip(samples: &mut [f64]) -> usize {
    let mut clipped = 0;
    for s in samples.iter_mut() {
        if s.abs() > 1.0 {
            *s = s.clamp(-1.0, 1.0);
            clipped += 1;
        }
    }
    clipped
}

/// Root mean square level in dB relative to full scale
pub fn rms_dbfs(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    let power = samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64;
    10.0 * power.log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_conversion() {
        let out = i16_to_f64(&[0, 16384, -32768]);
        assert_eq!(out, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_stereo_to_mono() {
        let stereo = vec![0.2, 0.8, 0.4, 0.6]; // [L, R, L, R]
        let mono = to_mono(&stereo, 2).unwrap();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 1e-12);
        assert!((mono[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_three_channel_mix() {
        let mono = to_mono(&[0.3, 0.6, 0.9, -0.3, 0.0, 0.3], 3).unwrap();
        assert!((mono[0] - 0.6).abs() < 1e-12);
        assert!(mono[1].abs() < 1e-12);
    }

    #[test]
    fn test_bad_channel_layout() {
        assert!(to_mono(&[0.1, 0.2, 0.3], 2).is_err());
        assert!(to_mono(&[0.1], 0).is_err());
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resample_linear(&samples, 48000, 48000), samples);
    }

    #[test]
    fn test_upsample_interpolates() {
        let up = resample_linear(&[0.0, 1.0, 2.0], 8000, 16000);
        assert_eq!(up.len(), 6);
        assert!((up[1] - 0.5).abs() < 1e-12);
        assert!((up[3] - 1.5).abs() < 1e-12);
        assert_eq!(up[5], 2.0);
    }

    #[test]
    fn test_downsample_length() {
        let samples: Vec<f64> = (0..48000).map(|i| (i as f64 * 0.01).sin()).collect();
        let down = resample_linear(&samples, 48000, 16000);
        assert_eq!(down.len(), 16000);
    }

    #[test]
    fn test_gain() {
        assert!((db_to_gain(0.0, 0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_gain(-20.0, 0.0) - 0.1).abs() < 1e-12);
        assert!((db_to_gain(-6.0, -6.0) - 1.0).abs() < 1e-12);
        let scaled = scale_db(&[0.5, -0.5], 20.0, 0.0);
        assert!((scaled[0] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_hard_clip() {
        let mut samples = vec![0.5, 1.5, -2.0, -0.999];
        assert_eq!(hard_clip(&mut samples), 2);
        assert_eq!(samples, vec![0.5, 1.0, -1.0, -0.999]);
    }

    #[test]
    fn test_rms_level() {
        let square = vec![0.5, -0.5, 0.5, -0.5];
        assert!((rms_dbfs(&square) - 20.0 * 0.5f64.log10()).abs() < 1e-9);
        assert_eq!(rms_dbfs(&[]), f64::NEG_INFINITY);
    }
}
