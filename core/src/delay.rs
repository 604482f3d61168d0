use crate::error::{Result, TvoError};
use crate::fft_correlation::peak_lag;

/// Estimates how many samples the received waveform lags the transmitted one.
///
/// The result may be negative when the receive capture starts late.
pub trait DelayEstimator {
    fn estimate_delay(&self, rx: &[f64], tx: &[f64], sample_rate: f64) -> Result<i64>;
}

/// Delay at the peak of the full cross-correlation of rx against tx.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationDelayEstimator;

impl DelayEstimator for CorrelationDelayEstimator {
    fn estimate_delay(&self, rx: &[f64], tx: &[f64], _sample_rate: f64) -> Result<i64> {
        peak_lag(rx, tx)?.ok_or_else(|| {
            TvoError::InvalidInput(format!(
                "cannot estimate delay with rx of {} and tx of {} samples",
                rx.len(),
                tx.len()
            ))
        })
    }
}

/// Always reports the same delay. Useful when alignment is known up front.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub i64);

impl DelayEstimator for FixedDelay {
    fn estimate_delay(&self, _rx: &[f64], _tx: &[f64], _sample_rate: f64) -> Result<i64> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SAMPLE_RATE;

    fn burst(len: usize) -> Vec<f64> {
        let mut state = 0x2545_F491u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f64 / u32::MAX as f64) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn positive_delay() {
        let tx = burst(2000);
        let mut rx = vec![0.0; 500];
        rx.extend_from_slice(&tx);
        rx.extend_from_slice(&[0.0; 100]);

        let delay = CorrelationDelayEstimator.estimate_delay(&rx, &tx, SAMPLE_RATE).unwrap();
        assert_eq!(delay, 500);
    }

    #[test]
    fn negative_delay() {
        let tx = burst(2000);
        let rx = tx[120..].to_vec();
        let delay = CorrelationDelayEstimator.estimate_delay(&rx, &tx, SAMPLE_RATE).unwrap();
        assert_eq!(delay, -120);
    }

    #[test]
    fn empty_input() {
        assert!(CorrelationDelayEstimator.estimate_delay(&[], &[1.0], SAMPLE_RATE).is_err());
    }
}
