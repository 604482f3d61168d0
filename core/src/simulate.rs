//! Software channel for running calibrations without audio hardware
//!
//! Each trial plays the next clip at the requested volume through a model of
//! the radio path: linear gain relative to the device volume, a Gaussian
//! noise floor, a fixed transport delay and hard clipping at full scale. The
//! capture is then scored against the clean clip.

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::audio::{db_to_gain, hard_clip};
use crate::controller::{TrialExecutor, TrialMeasurement};
use crate::error::{Result, TvoError};
use crate::scorer::DistortionScorer;

/// Channel label written to the trial records
pub const SIMULATED_CHANNEL: &str = "rx_voice";

/// A named transmit clip, mono at the channel's sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub name: String,
    pub samples: Vec<f64>,
}

impl Clip {
    pub fn new(name: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }
}

pub struct SimulatedChannel {
    clips: Vec<Clip>,
    scorer: DistortionScorer,
    sample_rate: f64,
    device_db: f64,
    noise: Option<Normal<f64>>,
    delay_samples: usize,
    rng: StdRng,
    next_clip: usize,
}

impl SimulatedChannel {
    pub fn new(clips: Vec<Clip>, scorer: DistortionScorer, sample_rate: f64) -> Result<Self> {
        if clips.is_empty() {
            return Err(TvoError::InvalidInput("simulated channel needs at least one clip".into()));
        }
        if let Some(clip) = clips.iter().find(|c| c.samples.is_empty()) {
            return Err(TvoError::InvalidInput(format!("clip '{}' is empty", clip.name)));
        }
        scorer.check_sample_rate(sample_rate)?;

        Ok(Self {
            clips,
            scorer,
            sample_rate,
            device_db: 0.0,
            noise: None,
            delay_samples: 0,
            rng: StdRng::from_entropy(),
            next_clip: 0,
        })
    }

    /// Volume at which the clips play back unscaled.
    pub fn with_device_volume(mut self, device_db: f64) -> Self {
        self.device_db = device_db;
        self
    }

    /// Adds white noise with an RMS level of `floor_dbfs`.
    pub fn with_noise_floor(mut self, floor_dbfs: f64) -> Result<Self> {
        let std = 10f64.powf(floor_dbfs / 20.0);
        let normal = Normal::new(0.0, std)
            .map_err(|e| TvoError::InvalidConfig(format!("noise floor {} dBFS: {}", floor_dbfs, e)))?;
        self.noise = Some(normal);
        Ok(self)
    }

    pub fn with_delay(mut self, delay_samples: usize) -> Self {
        self.delay_samples = delay_samples;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    /// Capture of `clip` played at `volume_db`.
    pub fn transmit(&mut self, clip: &[f64], volume_db: f64) -> Vec<f64> {
        let gain = db_to_gain(volume_db, self.device_db);
        let mut rx = vec![0.0; self.delay_samples];
        rx.extend(clip.iter().map(|s| s * gain));

        if let Some(noise) = &self.noise {
            for s in rx.iter_mut() {
                *s += noise.sample(&mut self.rng);
            }
        }

        let clipped = hard_clip(&mut rx);
        if clipped > 0 {
            debug!("{} of {} samples clipped at {} dB", clipped, rx.len(), volume_db);
        }
        rx
    }
}

impl TrialExecutor for SimulatedChannel {
    fn run_trial(&mut self, volume_db: f64) -> Result<TrialMeasurement> {
        let index = self.next_clip % self.clips.len();
        self.next_clip += 1;

        let tx = std::mem::take(&mut self.clips[index].samples);
        let rx = self.transmit(&tx, volume_db);
        let report = self.scorer.evaluate(&tx, &rx, self.sample_rate);
        self.clips[index].samples = tx;
        let report = report?;

        Ok(TrialMeasurement {
            score: report.score,
            latency_s: report.latency_s,
            clip: self.clips[index].name.clone(),
            channels: SIMULATED_CHANNEL.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::{BandSet, FrequencyBand};
    use crate::config::ScorerConfig;
    use crate::SAMPLE_RATE;
    use std::f64::consts::PI;

    fn tone_stack(len: usize) -> Vec<f64> {
        (0..len)
            .map(|n| {
                let t = n as f64 / SAMPLE_RATE;
                let sum: f64 = (1..=20)
                    .map(|h| (2.0 * PI * 150.0 * h as f64 * t + h as f64).sin() / (h * h) as f64)
                    .sum();
                0.1 * sum
            })
            .collect()
    }

    fn channel() -> SimulatedChannel {
        let clips = vec![Clip::new("a", tone_stack(12_000)), Clip::new("b", tone_stack(9_600))];
        SimulatedChannel::new(clips, DistortionScorer::default(), SAMPLE_RATE)
            .unwrap()
            .with_seed(5)
    }

    #[test]
    fn rejects_empty_clip_list() {
        let result = SimulatedChannel::new(Vec::new(), DistortionScorer::default(), SAMPLE_RATE);
        assert!(matches!(result, Err(TvoError::InvalidInput(_))));
    }

    #[test]
    fn rejects_band_above_nyquist() {
        let bands = BandSet::new(vec![
            FrequencyBand::new(200.0, 450.0),
            FrequencyBand::new(400.0, 650.0),
            FrequencyBand::new(30_000.0, 31_000.0),
        ])
        .unwrap();
        let scorer = DistortionScorer::new(&ScorerConfig {
            bands,
            ..Default::default()
        })
        .unwrap();
        let result = SimulatedChannel::new(vec![Clip::new("a", tone_stack(4_800))], scorer, SAMPLE_RATE);
        assert!(matches!(result, Err(TvoError::InvalidConfig(_))));
    }

    #[test]
    fn device_volume_sets_unity_gain_point() {
        let clip = tone_stack(480);
        let mut ch = channel().with_device_volume(-6.0);
        assert_eq!(ch.transmit(&clip, -6.0), clip);

        let quieter = ch.transmit(&clip, -26.0);
        for (q, c) in quieter.iter().zip(&clip) {
            assert!((q - c * 0.1).abs() < 1e-12);
        }
    }

    #[test]
    fn clean_channel_scores_one() {
        let mut ch = channel();
        let m = ch.run_trial(-20.0).unwrap();
        assert!((m.score - 1.0).abs() < 1e-9, "score {}", m.score);
        assert_eq!(m.clip, "a");
        assert_eq!(m.channels, SIMULATED_CHANNEL);
    }

    #[test]
    fn cycles_through_clips() {
        let mut ch = channel();
        let names: Vec<String> = (0..3).map(|_| ch.run_trial(-20.0).unwrap().clip).collect();
        assert_eq!(names, vec!["a", "b", "a"]);
    }

    #[test]
    fn loud_playback_clips() {
        let mut ch = channel();
        let rx = ch.transmit(&tone_stack(4_800), 30.0);
        assert!(rx.iter().all(|s| s.abs() <= 1.0));
        assert!(rx.iter().any(|s| s.abs() == 1.0));

        let m = ch.run_trial(30.0).unwrap();
        assert!((m.score - 1.0).abs() > 0.05, "score {}", m.score);
    }

    #[test]
    fn delay_is_reported_as_latency() {
        let mut ch = channel().with_delay(960);
        let m = ch.run_trial(-10.0).unwrap();
        assert!((m.latency_s - 0.02).abs() < 1e-12);
        assert!((m.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let run = |seed| {
            let mut ch = channel().with_noise_floor(-50.0).unwrap().with_seed(seed);
            ch.run_trial(-6.0).unwrap().score
        };
        assert_eq!(run(1), run(1));
        assert_ne!(run(1), run(2));
    }
}
