//! Greedy grouping of evaluation results
//!
//! Each new observation joins the first existing group whose pooled samples
//! it cannot be distinguished from, or starts a group of its own. The
//! outcome depends on evaluation order, which the controller keeps fixed.

use std::ops::Range;

use log::debug;

use crate::stats::{mean, EquivalenceTest};

/// Observations judged statistically equivalent.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    members: Vec<usize>,
    samples: Vec<f64>,
}

impl Group {
    fn singleton(index: usize, samples: &[f64]) -> Self {
        Self {
            members: vec![index],
            samples: samples.to_vec(),
        }
    }

    fn absorb(&mut self, index: usize, samples: &[f64]) {
        self.members.push(index);
        self.samples.extend_from_slice(samples);
    }

    /// Observation indices in join order.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Pooled samples of every member.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Number of member observations. A plateau needs more than one.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn mean_score(&self) -> f64 {
        mean(&self.samples)
    }

    /// Rewards both a high mean and corroborating samples.
    pub fn score(&self) -> f64 {
        self.mean_score() * self.sample_count() as f64
    }
}

pub struct EquivalenceClusterer<T> {
    test: T,
}

impl<T: EquivalenceTest> EquivalenceClusterer<T> {
    pub fn new(test: T) -> Self {
        Self { test }
    }

    /// Places one observation, returning the index of the group it landed in.
    pub fn assign(&mut self, groups: &mut Vec<Group>, index: usize, samples: &[f64]) -> usize {
        for (gi, group) in groups.iter_mut().enumerate() {
            if self.test.equivalent(samples, group.samples()) {
                group.absorb(index, samples);
                return gi;
            }
        }
        groups.push(Group::singleton(index, samples));
        groups.len() - 1
    }

    /// Places the observations of one round in ascending index order.
    ///
    /// Observations with no samples (every trial failed) are left out.
    pub fn cluster_round(&mut self, groups: &mut Vec<Group>, sample_sets: &[Vec<f64>], round: Range<usize>) {
        for index in round {
            let Some(samples) = sample_sets.get(index) else {
                break;
            };
            if samples.is_empty() {
                debug!("Observation {} has no usable samples, not clustered", index);
                continue;
            }
            let gi = self.assign(groups, index, samples);
            debug!("Observation {} joined group {} (size {})", index, gi, groups[gi].size());
        }
    }
}

/// Index of the highest scoring group, if it has more than one member.
///
/// A single-member winner means no plateau is statistically supported yet.
pub fn dominant_group(groups: &[Group]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (gi, group) in groups.iter().enumerate() {
        let score = group.score();
        match best {
            Some((_, best_score)) if !(score > best_score) => {}
            _ => best = Some((gi, score)),
        }
    }
    best.and_then(|(gi, _)| (groups[gi].size() > 1).then_some(gi))
}
