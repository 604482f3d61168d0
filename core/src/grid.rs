//! Evaluation grid for the volume search
//!
//! The first round spreads `points` volumes evenly over the search interval.
//! Every later round halves the spacing. Until a plateau is known the whole
//! interval is swept again at the finer spacing; afterwards only the two
//! plateau edges are probed from both sides. Volumes already visited are
//! never proposed again.

use log::debug;
use serde::{Deserialize, Serialize};

/// Current region of interest, in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchInterval {
    pub lower: f64,
    pub upper: f64,
}

impl SearchInterval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Smallest interval holding every volume, `None` when empty.
    pub fn spanning(volumes: impl IntoIterator<Item = f64>) -> Option<Self> {
        volumes.into_iter().fold(None, |acc, v| match acc {
            None => Some(Self::new(v, v)),
            Some(iv) => Some(Self::new(iv.lower.min(v), iv.upper.max(v))),
        })
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Point at `fraction` of the way from `lower` to `upper`.
    pub fn point_at(&self, fraction: f64) -> f64 {
        self.lower + fraction * self.width()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GridPhase {
    Initial,
    Refining,
    Converged,
}

/// Two volumes closer than `spacing / DUPLICATE_DIVISOR` count as the same.
const DUPLICATE_DIVISOR: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct AdaptiveGridSearch {
    tolerance: f64,
    spacing: f64,
    interval: SearchInterval,
    phase: GridPhase,
    round: usize,
    window_found: bool,
    grid: Vec<f64>,
    cursor: usize,
}

impl AdaptiveGridSearch {
    /// Initial round: `points` (at least 2) volumes from `lower` to `upper`.
    pub fn new(interval: SearchInterval, points: usize, tolerance: f64) -> Self {
        let grid = linspace(interval.lower, interval.upper, points.max(2));
        let spacing = mean_gap(&grid);
        Self {
            tolerance,
            spacing,
            interval,
            phase: GridPhase::Initial,
            round: 0,
            window_found: false,
            grid,
            cursor: 0,
        }
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn interval(&self) -> SearchInterval {
        self.interval
    }

    pub fn phase(&self) -> GridPhase {
        self.phase
    }

    pub fn is_converged(&self) -> bool {
        self.phase == GridPhase::Converged
    }

    pub fn window_found(&self) -> bool {
        self.window_found
    }

    /// Number of refinements so far; 0 during the initial round.
    pub fn round(&self) -> usize {
        self.round
    }

    /// Volumes of the current round, in evaluation order.
    pub fn round_volumes(&self) -> &[f64] {
        &self.grid
    }

    /// Next unvisited volume of the current round, `None` once exhausted.
    pub fn next_volume(&mut self) -> Option<f64> {
        let volume = self.grid.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(volume)
    }

    pub fn round_exhausted(&self) -> bool {
        self.cursor >= self.grid.len()
    }

    /// Starts the next round.
    ///
    /// `plateau` is the span of the dominant group, if one exists; `visited`
    /// holds every volume evaluated so far. Rounds whose candidates were all
    /// visited already are skipped.
    pub fn refine(&mut self, plateau: Option<SearchInterval>, visited: &[f64]) -> GridPhase {
        if self.is_converged() {
            return self.phase;
        }
        if let Some(plateau) = plateau {
            self.interval = plateau;
            self.window_found = true;
        }

        loop {
            self.spacing /= 2.0;
            self.round += 1;
            self.grid.clear();
            self.cursor = 0;

            if self.spacing < self.tolerance {
                debug!(
                    "Grid converged after {} rounds (spacing {:.4} dB < {:.4} dB)",
                    self.round, self.spacing, self.tolerance
                );
                self.phase = GridPhase::Converged;
                return self.phase;
            }
            self.phase = GridPhase::Refining;

            let candidates = if self.window_found {
                self.edge_probes()
            } else {
                self.sweep()
            };
            let min_gap = self.spacing / DUPLICATE_DIVISOR;
            self.grid = candidates
                .into_iter()
                .filter(|c| visited.iter().all(|v| (c - v).abs() >= min_gap))
                .collect();

            debug!(
                "Round {}: spacing {:.4} dB over [{:.3}, {:.3}] dB, {} new volume(s)",
                self.round,
                self.spacing,
                self.interval.lower,
                self.interval.upper,
                self.grid.len()
            );

            if !self.grid.is_empty() {
                return self.phase;
            }
        }
    }

    fn edge_probes(&self) -> Vec<f64> {
        let SearchInterval { lower, upper } = self.interval;
        let s = self.spacing;
        vec![lower - s, lower + s, upper - s, upper + s]
    }

    fn sweep(&self) -> Vec<f64> {
        let SearchInterval { lower, upper } = self.interval;
        (0..)
            .map(|k| lower + k as f64 * self.spacing)
            .take_while(|&v| v < upper)
            .collect()
    }
}

/// `points` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (points - 1) as f64;
            (0..points)
                .map(|i| if i == points - 1 { end } else { start + i as f64 * step })
                .collect()
        }
    }
}

fn mean_gap(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let total: f64 = values.windows(2).map(|w| w[1] - w[0]).sum();
    total / (values.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(grid: &mut AdaptiveGridSearch, visited: &mut Vec<f64>) {
        while let Some(v) = grid.next_volume() {
            visited.push(v);
        }
    }

    #[test]
    fn initial_grid_is_linear() {
        let mut grid = AdaptiveGridSearch::new(SearchInterval::new(-40.0, 0.0), 10, 1.0);
        assert_eq!(grid.phase(), GridPhase::Initial);
        assert!((grid.spacing() - 40.0 / 9.0).abs() < 1e-12);

        let mut visited = Vec::new();
        drain(&mut grid, &mut visited);
        assert_eq!(visited.len(), 10);
        assert_eq!(visited[0], -40.0);
        assert_eq!(visited[9], 0.0);
        assert!(grid.round_exhausted());
        assert_eq!(grid.next_volume(), None);
    }

    #[test]
    fn sweep_skips_visited_volumes() {
        let mut grid = AdaptiveGridSearch::new(SearchInterval::new(0.0, 8.0), 3, 0.1);
        let mut visited = Vec::new();
        drain(&mut grid, &mut visited);
        assert_eq!(visited, vec![0.0, 4.0, 8.0]);

        assert_eq!(grid.refine(None, &visited), GridPhase::Refining);
        assert_eq!(grid.spacing(), 2.0);
        // 0 and 4 were visited; 8 is the excluded upper edge
        assert_eq!(grid.round_volumes(), &[2.0, 6.0]);
    }

    #[test]
    fn plateau_probes_both_edges() {
        let mut grid = AdaptiveGridSearch::new(SearchInterval::new(-40.0, 0.0), 5, 0.5);
        let mut visited = Vec::new();
        drain(&mut grid, &mut visited);

        let plateau = SearchInterval::new(-20.0, 0.0);
        grid.refine(Some(plateau), &visited);

        assert!(grid.window_found());
        assert_eq!(grid.interval(), plateau);
        assert_eq!(grid.spacing(), 5.0);
        assert_eq!(grid.round_volumes(), &[-25.0, -15.0, -5.0, 5.0]);
    }

    #[test]
    fn keeps_probing_last_plateau() {
        let mut grid = AdaptiveGridSearch::new(SearchInterval::new(-40.0, 0.0), 5, 0.5);
        let mut visited = Vec::new();
        drain(&mut grid, &mut visited);
        grid.refine(Some(SearchInterval::new(-20.0, 0.0)), &visited);
        drain(&mut grid, &mut visited);

        grid.refine(None, &visited);
        assert_eq!(grid.round_volumes(), &[-22.5, -17.5, -2.5, 2.5]);
    }

    #[test]
    fn near_duplicates_are_filtered() {
        let mut grid = AdaptiveGridSearch::new(SearchInterval::new(-40.0, 0.0), 5, 0.5);
        let mut visited = Vec::new();
        drain(&mut grid, &mut visited);
        // Drifted copies of two probes: within spacing / 100 of them
        visited.push(-25.0 + 1e-9);
        visited.push(5.0 - 0.04);

        grid.refine(Some(SearchInterval::new(-20.0, 0.0)), &visited);
        assert_eq!(grid.round_volumes(), &[-15.0, -5.0]);
    }

    #[test]
    fn spacing_halves_every_round() {
        let mut grid = AdaptiveGridSearch::new(SearchInterval::new(-40.0, 0.0), 5, 0.01);
        let mut visited = Vec::new();
        let mut previous = grid.spacing();
        for _ in 0..6 {
            drain(&mut grid, &mut visited);
            grid.refine(Some(SearchInterval::new(-20.0, 0.0)), &visited);
            assert!(!grid.round_volumes().is_empty());
            assert!(grid.spacing() < previous);
            assert!((grid.spacing() - previous / 2.0).abs() < 1e-12);
            previous = grid.spacing();
        }
    }

    #[test]
    fn rounds_to_converge_follow_log2() {
        for (width, tolerance) in [(8.0, 1.0), (10.0, 1.0), (40.0, 0.5), (3.0, 0.1), (1.0, 0.3)] {
            let mut grid = AdaptiveGridSearch::new(SearchInterval::new(0.0, width), 2, tolerance);
            let mut visited = Vec::new();
            while !grid.is_converged() {
                drain(&mut grid, &mut visited);
                grid.refine(None, &visited);
                assert!(grid.round() < 64);
            }
            let expected = (width / tolerance).log2().ceil() as i64;
            let rounds = grid.round() as i64;
            assert!(
                (rounds - expected).abs() <= 1,
                "width {} tol {}: {} rounds, expected {}",
                width,
                tolerance,
                rounds,
                expected
            );
            assert_eq!(grid.next_volume(), None);
        }
    }

    #[test]
    fn converged_grid_stays_converged() {
        let mut grid = AdaptiveGridSearch::new(SearchInterval::new(0.0, 1.0), 2, 0.6);
        let visited = vec![0.0, 1.0];
        assert_eq!(grid.refine(None, &visited), GridPhase::Converged);
        let spacing = grid.spacing();
        assert_eq!(grid.refine(None, &visited), GridPhase::Converged);
        assert_eq!(grid.spacing(), spacing);
    }

    #[test]
    fn linspace_endpoints() {
        assert_eq!(linspace(-1.0, 1.0, 5), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert!(linspace(2.0, 3.0, 0).is_empty());
    }

    #[test]
    fn spanning_interval() {
        let iv = SearchInterval::spanning([3.0, -1.0, 2.0]).unwrap();
        assert_eq!(iv, SearchInterval::new(-1.0, 3.0));
        assert!(SearchInterval::spanning(Vec::new()).is_none());
        assert_eq!(iv.point_at(0.8), -1.0 + 0.8 * 4.0);
    }
}
