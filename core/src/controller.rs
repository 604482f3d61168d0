//! Calibration run orchestration
//!
//! A run walks the [`AdaptiveGridSearch`] one volume at a time. Each volume is
//! measured `trials` times through a [`TrialExecutor`]; the dithered scores
//! form that volume's sample set. When a round of the grid is exhausted the
//! new sample sets are clustered, the dominant plateau (if any) re-centers the
//! grid and the next round begins. The run ends when the grid converges or
//! the volume budget is spent.
//!
//! The lifecycle is explicit: [`CalibrationController::start`] creates a
//! [`SearchState`], [`CalibrationController::step`] advances it by one volume
//! and [`CalibrationController::finish`] turns it into a report.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::cluster::{dominant_group, EquivalenceClusterer, Group};
use crate::config::CalibrationConfig;
use crate::error::{Result, TvoError};
use crate::grid::{AdaptiveGridSearch, GridPhase, SearchInterval};
use crate::record::{timestamp_now, OptimumRecord, TrialRecord};
use crate::stats::{ApproxPermutationTest, EquivalenceTest};
use crate::OPTIMUM_FRACTION;

/// One scored trial as reported by a [`TrialExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrialMeasurement {
    pub score: f64,
    pub latency_s: f64,
    /// Name of the clip that was played
    pub clip: String,
    /// Recorded channel description
    pub channels: String,
}

impl TrialMeasurement {
    pub fn from_score(score: f64) -> Self {
        Self {
            score,
            latency_s: 0.0,
            clip: String::new(),
            channels: String::new(),
        }
    }
}

/// Plays audio at a volume and scores what comes back.
///
/// Implementations may block for as long as a trial takes; the controller
/// imposes no timeout.
pub trait TrialExecutor {
    fn run_trial(&mut self, volume_db: f64) -> Result<TrialMeasurement>;
}

impl<F> TrialExecutor for F
where
    F: FnMut(f64) -> Result<f64>,
{
    fn run_trial(&mut self, volume_db: f64) -> Result<TrialMeasurement> {
        self(volume_db).map(TrialMeasurement::from_score)
    }
}

/// External "test running" signal, e.g. a light on the radio interface.
pub trait Indicator {
    fn set_active(&mut self, active: bool);
}

/// For runs without an indicator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn set_active(&mut self, _active: bool) {}
}

/// Holds an indicator on and switches it off when dropped, on every exit
/// path of the run including errors and panics.
pub struct IndicatorGuard<'a, I: Indicator + ?Sized> {
    indicator: &'a mut I,
}

impl<'a, I: Indicator + ?Sized> IndicatorGuard<'a, I> {
    pub fn activate(indicator: &'a mut I) -> Self {
        indicator.set_active(true);
        Self { indicator }
    }
}

impl<I: Indicator + ?Sized> Drop for IndicatorGuard<'_, I> {
    fn drop(&mut self) {
        self.indicator.set_active(false);
    }
}

/// Recommended volume and the interval it was chosen from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingPoint {
    pub optimum: f64,
    pub interval: SearchInterval,
}

impl OperatingPoint {
    /// Biased toward the loud end of the plateau.
    pub fn from_interval(interval: SearchInterval) -> Self {
        Self {
            optimum: interval.point_at(OPTIMUM_FRACTION),
            interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotFoundReason {
    /// No group with more than one member dominated
    NoPlateau,
    /// The volume budget ran out before the grid converged
    BudgetExhausted {
        visited: usize,
        interval: Option<SearchInterval>,
    },
    /// Volumes were given explicitly, no search took place
    FixedVolumes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    Found(OperatingPoint),
    NotFound(NotFoundReason),
}

impl CalibrationOutcome {
    pub fn operating_point(&self) -> Option<&OperatingPoint> {
        match self {
            CalibrationOutcome::Found(point) => Some(point),
            CalibrationOutcome::NotFound(_) => None,
        }
    }
}

/// Sample set gathered at one visited volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub volume: f64,
    /// Dithered scores, one per successful trial
    pub samples: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub outcome: CalibrationOutcome,
    pub evaluations: Vec<Evaluation>,
    pub groups: Vec<Group>,
    pub trials: Vec<TrialRecord>,
    /// Grid refinements performed
    pub rounds: usize,
}

impl CalibrationReport {
    pub fn optimum_record(&self) -> OptimumRecord {
        OptimumRecord::from_outcome(&self.outcome)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// More volumes remain
    Continue,
    Converged,
    BudgetExhausted,
}

/// Everything a run accumulates. Owned by one run, discarded at its end.
#[derive(Debug, Clone)]
pub struct SearchState {
    grid: AdaptiveGridSearch,
    visited: Vec<f64>,
    sample_sets: Vec<Vec<f64>>,
    groups: Vec<Group>,
    round_start: usize,
    trials: Vec<TrialRecord>,
}

impl SearchState {
    pub fn grid(&self) -> &AdaptiveGridSearch {
        &self.grid
    }

    pub fn spacing(&self) -> f64 {
        self.grid.spacing()
    }

    pub fn interval(&self) -> SearchInterval {
        self.grid.interval()
    }

    pub fn window_found(&self) -> bool {
        self.grid.window_found()
    }

    pub fn visited(&self) -> &[f64] {
        &self.visited
    }

    pub fn sample_sets(&self) -> &[Vec<f64>] {
        &self.sample_sets
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// Span of the dominant group's volumes, if a plateau has formed.
    pub fn plateau(&self) -> Option<SearchInterval> {
        let gi = dominant_group(&self.groups)?;
        SearchInterval::spanning(self.groups[gi].members().iter().map(|&i| self.visited[i]))
    }

    /// Earlier evaluation within `gap` dB of `volume`.
    fn repeat_of(&self, volume: f64, gap: f64) -> Option<usize> {
        self.visited.iter().position(|v| (volume - v).abs() < gap)
    }

    fn record(&mut self, volume: f64, samples: Vec<f64>) {
        self.visited.push(volume);
        self.sample_sets.push(samples);
    }

    fn evaluations(&self) -> Vec<Evaluation> {
        self.visited
            .iter()
            .zip(&self.sample_sets)
            .map(|(&volume, samples)| Evaluation {
                volume,
                samples: samples.clone(),
            })
            .collect()
    }
}

pub struct CalibrationController<T = ApproxPermutationTest, R = StdRng> {
    config: CalibrationConfig,
    clusterer: EquivalenceClusterer<T>,
    dither: Option<Normal<f64>>,
    rng: R,
}

impl CalibrationController<ApproxPermutationTest, StdRng> {
    /// Controller with the default permutation test, seeded from
    /// `config.seed` when present.
    pub fn new(config: CalibrationConfig) -> Result<Self> {
        let (test, rng) = match config.seed {
            Some(seed) => (
                ApproxPermutationTest::seeded(seed.wrapping_add(1)),
                StdRng::seed_from_u64(seed),
            ),
            None => (ApproxPermutationTest::from_entropy(), StdRng::from_entropy()),
        };
        Self::with_parts(config, test, rng)
    }
}

impl<T: EquivalenceTest, R: Rng> CalibrationController<T, R> {
    pub fn with_parts(config: CalibrationConfig, test: T, rng: R) -> Result<Self> {
        config.validate()?;
        let dither = if config.dither_std > 0.0 {
            Some(
                Normal::new(0.0, config.dither_std)
                    .map_err(|e| TvoError::InvalidConfig(format!("dither: {}", e)))?,
            )
        } else {
            None
        };
        Ok(Self {
            config,
            clusterer: EquivalenceClusterer::new(test),
            dither,
            rng,
        })
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn start(&self) -> SearchState {
        let interval = SearchInterval::new(self.config.lower_db, self.config.upper_db);
        info!(
            "Starting volume search over [{}, {}] dB, {} initial points, tolerance {} dB",
            interval.lower, interval.upper, self.config.points, self.config.tolerance_db
        );
        SearchState {
            grid: AdaptiveGridSearch::new(interval, self.config.points, self.config.tolerance_db),
            visited: Vec::new(),
            sample_sets: Vec::new(),
            groups: Vec::new(),
            round_start: 0,
            trials: Vec::new(),
        }
    }

    /// Evaluates the next volume and closes the round when it was the last.
    pub fn step<E>(&mut self, state: &mut SearchState, executor: &mut E) -> Result<StepStatus>
    where
        E: TrialExecutor + ?Sized,
    {
        if state.grid.is_converged() {
            return Ok(StepStatus::Converged);
        }
        if state.visited.len() >= self.config.max_volumes {
            return Ok(StepStatus::BudgetExhausted);
        }

        let volume = loop {
            match state.grid.next_volume() {
                Some(volume) => break volume,
                None => {
                    if self.close_round(state) == GridPhase::Converged {
                        return Ok(StepStatus::Converged);
                    }
                }
            }
        };

        let samples = match state.repeat_of(volume, self.config.tolerance_db / 1000.0) {
            Some(prior) => {
                info!(
                    "Repeating volume of {} dB, reusing results of evaluation {} ({} dB)",
                    volume, prior, state.visited[prior]
                );
                state.sample_sets[prior].clone()
            }
            None => self.measure(state, volume, executor)?,
        };
        state.record(volume, samples);

        if state.grid.round_exhausted() && self.close_round(state) == GridPhase::Converged {
            return Ok(StepStatus::Converged);
        }
        if state.visited.len() >= self.config.max_volumes {
            return Ok(StepStatus::BudgetExhausted);
        }
        Ok(StepStatus::Continue)
    }

    pub fn finish(&self, state: SearchState) -> CalibrationReport {
        let plateau = state.plateau();
        let outcome = match (state.grid.is_converged(), plateau) {
            (true, Some(interval)) => {
                let point = OperatingPoint::from_interval(interval);
                info!(
                    "Optimal interval: [{}, {}] dB, optimum {} dB",
                    interval.lower, interval.upper, point.optimum
                );
                CalibrationOutcome::Found(point)
            }
            (true, None) => {
                warn!("No groups formed. Optimal interval not found.");
                CalibrationOutcome::NotFound(NotFoundReason::NoPlateau)
            }
            (false, interval) => {
                warn!(
                    "Volume budget of {} exhausted before the search converged",
                    self.config.max_volumes
                );
                CalibrationOutcome::NotFound(NotFoundReason::BudgetExhausted {
                    visited: state.visited.len(),
                    interval,
                })
            }
        };

        CalibrationReport {
            outcome,
            evaluations: state.evaluations(),
            rounds: state.grid.round(),
            groups: state.groups,
            trials: state.trials,
        }
    }

    /// Full run: search, or evaluate `config.volumes` when given.
    ///
    /// Only the search reuses repeated volumes; a fixed list is measured
    /// entry by entry.
    ///
    /// The indicator is on for the duration of the run.
    pub fn run<E, I>(&mut self, executor: &mut E, indicator: &mut I) -> Result<CalibrationReport>
    where
        E: TrialExecutor + ?Sized,
        I: Indicator + ?Sized,
    {
        let _active = IndicatorGuard::activate(indicator);

        if !self.config.volumes.is_empty() {
            return self.run_fixed(executor);
        }

        let mut state = self.start();
        loop {
            match self.step(&mut state, executor)? {
                StepStatus::Continue => {}
                StepStatus::Converged | StepStatus::BudgetExhausted => break,
            }
        }
        Ok(self.finish(state))
    }

    fn run_fixed<E>(&mut self, executor: &mut E) -> Result<CalibrationReport>
    where
        E: TrialExecutor + ?Sized,
    {
        let mut state = self.start();
        let volumes = self.config.volumes.clone();
        info!("Evaluating {} fixed volume(s), no search", volumes.len());
        for volume in volumes {
            let samples = self.measure(&mut state, volume, executor)?;
            state.record(volume, samples);
        }
        Ok(CalibrationReport {
            outcome: CalibrationOutcome::NotFound(NotFoundReason::FixedVolumes),
            evaluations: state.evaluations(),
            rounds: 0,
            groups: Vec::new(),
            trials: state.trials,
        })
    }

    fn close_round(&mut self, state: &mut SearchState) -> GridPhase {
        let round = state.round_start..state.visited.len();
        self.clusterer.cluster_round(&mut state.groups, &state.sample_sets, round);
        state.round_start = state.visited.len();

        let plateau = state.plateau();
        match plateau {
            Some(iv) => debug!("Dominant plateau spans [{}, {}] dB", iv.lower, iv.upper),
            None => debug!("No plateau yet ({} group(s))", state.groups.len()),
        }

        let phase = state.grid.refine(plateau, &state.visited);
        info!(
            "Round {}: spacing {:.4} dB, {} volume(s) queued",
            state.grid.round(),
            state.grid.spacing(),
            state.grid.round_volumes().len()
        );
        phase
    }

    fn measure<E>(&mut self, state: &mut SearchState, volume: f64, executor: &mut E) -> Result<Vec<f64>>
    where
        E: TrialExecutor + ?Sized,
    {
        info!("Scaling volume to {} dB", volume);
        let mut scores = Vec::with_capacity(self.config.trials);
        for trial in 0..self.config.trials {
            let measurement = match executor.run_trial(volume) {
                Ok(m) => m,
                Err(e) if e.is_recoverable() => {
                    warn!("Trial {} at {} dB discarded: {}", trial + 1, volume, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !measurement.score.is_finite() {
                warn!("Trial {} at {} dB produced a non-finite score, discarded", trial + 1, volume);
                continue;
            }

            debug!("Trial {} at {} dB: FSF {}", trial + 1, volume, measurement.score);
            state.trials.push(TrialRecord {
                timestamp: timestamp_now(),
                filename: measurement.clip,
                volume,
                fsf: measurement.score,
                m2e_latency: measurement.latency_s,
                channels: measurement.channels,
            });
            scores.push(measurement.score);
        }

        if scores.is_empty() {
            warn!("No usable trials at {} dB", volume);
        } else {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            info!("Eval method returned {} at {} dB", mean, volume);
        }

        if let Some(dither) = &self.dither {
            for score in scores.iter_mut() {
                *score += dither.sample(&mut self.rng);
            }
        }
        Ok(scores)
    }
}
