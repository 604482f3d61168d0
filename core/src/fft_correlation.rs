//! FFT-based cross-correlation for real-valued signals
//!
//! Output follows the scipy.signal.correlate "full" convention: the result has
//! length `signal.len() + template.len() - 1` and index `k` holds the
//! correlation for the alignment where `template[template.len() - 1]` sits on
//! `signal[k]`. A template starting at `signal[i]` therefore peaks at
//! `i + template.len() - 1`.
//!
//! # References
//!
//! - scipy.signal.correlate: https://docs.scipy.org/doc/scipy/reference/generated/scipy.signal.correlate.html

use realfft::RealFftPlanner;
use crate::error::{Result, TvoError};

/// Full cross-correlation of `signal` against `template`.
///
/// Returns an empty vector if either input is empty.
///
/// # Errors
///
/// Returns `TvoError::FftError` if FFT processing fails.
pub fn fft_correlate_full(signal: &[f64], template: &[f64]) -> Result<Vec<f64>> {
    if signal.is_empty() || template.is_empty() {
        return Ok(Vec::new());
    }

    let full_len = signal.len() + template.len() - 1;
    let n = full_len.next_power_of_two();

    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut sig_buf = zero_padded(signal.iter().copied(), n);
    // Time-reversing a real template is the same as conjugating its spectrum,
    // so a plain product of spectra yields the correlation.
    let mut tpl_buf = zero_padded(template.iter().rev().copied(), n);

    let mut product = forward.make_output_vec();
    let mut tpl_spec = forward.make_output_vec();
    forward
        .process(&mut sig_buf, &mut product)
        .map_err(|e| TvoError::FftError(format!("forward FFT of signal: {:?}", e)))?;
    forward
        .process(&mut tpl_buf, &mut tpl_spec)
        .map_err(|e| TvoError::FftError(format!("forward FFT of template: {:?}", e)))?;

    product.iter_mut().zip(&tpl_spec).for_each(|(p, t)| *p *= *t);

    // DC and Nyquist must be purely real for the inverse real transform
    for bin in [0, product.len() - 1] {
        product[bin].im = 0.0;
    }

    let mut correlation = inverse.make_output_vec();
    inverse
        .process(&mut product, &mut correlation)
        .map_err(|e| TvoError::FftError(format!("inverse FFT: {:?}", e)))?;

    correlation.truncate(full_len);
    let scale = 1.0 / n as f64;
    for value in correlation.iter_mut() {
        *value *= scale;
    }
    Ok(correlation)
}

fn zero_padded(values: impl Iterator<Item = f64>, len: usize) -> Vec<f64> {
    let mut buf: Vec<f64> = values.collect();
    buf.resize(len, 0.0);
    buf
}

/// Offset of `template` within `signal` at the correlation peak.
///
/// Positive when the template content appears later in `signal`, negative when
/// it appears earlier. Returns `None` for empty inputs. Ties resolve to the
/// earliest lag.
pub fn peak_lag(signal: &[f64], template: &[f64]) -> Result<Option<i64>> {
    let correlation = fft_correlate_full(signal, template)?;
    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in correlation.iter().enumerate() {
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((idx, value)),
        }
    }
    Ok(best.map(|(idx, _)| idx as i64 - (template.len() as i64 - 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sliding_window_correlate(signal: &[f64], template: &[f64]) -> Vec<f64> {
        let output_len = signal.len() + template.len() - 1;
        let mut result = vec![0.0; output_len];
        for (lag, out) in result.iter_mut().enumerate() {
            for (i, &t) in template.iter().enumerate() {
                let signal_idx = lag as i64 - (template.len() as i64 - 1) + i as i64;
                if signal_idx >= 0 && (signal_idx as usize) < signal.len() {
                    *out += signal[signal_idx as usize] * t;
                }
            }
        }
        result
    }

    #[test]
    fn full_length() {
        let result = fft_correlate_full(&[1.0; 100], &[1.0; 10]).unwrap();
        assert_eq!(result.len(), 109);
    }

    #[test]
    fn impulse_template_shifts_signal() {
        let signal = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let template = vec![1.0, 0.0, 0.0];
        let result = fft_correlate_full(&signal, &template).unwrap();

        assert_eq!(result.len(), 7);
        for (i, expected) in [1.0, 2.0, 3.0, 4.0, 5.0].iter().enumerate() {
            assert!((result[i + 2] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn matches_sliding_window() {
        let signal = vec![1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        let template = vec![0.5, 1.0, 0.5];

        let fft_result = fft_correlate_full(&signal, &template).unwrap();
        let sliding_result = sliding_window_correlate(&signal, &template);

        assert_eq!(fft_result.len(), sliding_result.len());
        for (i, (a, b)) in fft_result.iter().zip(sliding_result.iter()).enumerate() {
            assert!((a - b).abs() < 1e-9, "Sample {} mismatch: FFT={}, sliding={}", i, a, b);
        }
    }

    #[test]
    fn empty_inputs() {
        assert!(fft_correlate_full(&[], &[1.0, 2.0]).unwrap().is_empty());
        assert!(fft_correlate_full(&[1.0, 2.0], &[]).unwrap().is_empty());
        assert_eq!(peak_lag(&[], &[]).unwrap(), None);
    }

    #[test]
    fn peak_lag_recovers_offset() {
        let template: Vec<f64> = (0..257).map(|i| ((i * 7919) % 101) as f64 - 50.0).collect();

        let mut delayed = vec![0.0; 40];
        delayed.extend_from_slice(&template);
        assert_eq!(peak_lag(&delayed, &template).unwrap(), Some(40));

        assert_eq!(peak_lag(&template, &template).unwrap(), Some(0));

        let advanced = template[25..].to_vec();
        assert_eq!(peak_lag(&advanced, &template).unwrap(), Some(-25));
    }
}
