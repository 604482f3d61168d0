use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Decides whether two samples are statistically indistinguishable.
pub trait EquivalenceTest {
    /// `true` when the samples are NOT significantly different.
    fn equivalent(&mut self, a: &[f64], b: &[f64]) -> bool;
}

impl<F> EquivalenceTest for F
where
    F: FnMut(&[f64], &[f64]) -> bool,
{
    fn equivalent(&mut self, a: &[f64], b: &[f64]) -> bool {
        self(a, b)
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Two-sided approximate permutation test on the difference of means.
///
/// The pooled observations are shuffled `resamples` times; the p-value is the
/// share of shuffles whose absolute mean difference reaches the observed one.
#[derive(Debug, Clone)]
pub struct ApproxPermutationTest {
    resamples: usize,
    alpha: f64,
    rng: StdRng,
}

pub const DEFAULT_RESAMPLES: usize = 10_000;
pub const DEFAULT_ALPHA: f64 = 0.05;

impl ApproxPermutationTest {
    pub fn new(resamples: usize, alpha: f64, rng: StdRng) -> Self {
        Self {
            resamples: resamples.max(1),
            alpha,
            rng,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(DEFAULT_RESAMPLES, DEFAULT_ALPHA, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(DEFAULT_RESAMPLES, DEFAULT_ALPHA, StdRng::from_entropy())
    }

    pub fn p_value(&mut self, a: &[f64], b: &[f64]) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let observed = (mean(a) - mean(b)).abs();
        let mut pooled: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
        let total: f64 = pooled.iter().sum();
        let (na, nb) = (a.len() as f64, b.len() as f64);
        // Guard against rounding making identical splits look more extreme
        let threshold = observed - 1e-12 * (1.0 + observed);

        let mut extreme = 0usize;
        for _ in 0..self.resamples {
            pooled.shuffle(&mut self.rng);
            let sum_a: f64 = pooled[..a.len()].iter().sum();
            let diff = (sum_a / na - (total - sum_a) / nb).abs();
            if diff >= threshold {
                extreme += 1;
            }
        }

        extreme as f64 / self.resamples as f64
    }
}

impl EquivalenceTest for ApproxPermutationTest {
    fn equivalent(&mut self, a: &[f64], b: &[f64]) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        self.p_value(a, b) >= self.alpha
    }
}
