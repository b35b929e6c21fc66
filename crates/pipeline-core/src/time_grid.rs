//! Uniform time grid shared by every stage downstream of Stage 2.

use crate::constellation::Constellation;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A uniform grid of sample instants anchored at a base epoch, per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeGrid {
    pub base_epoch: DateTime<Utc>,
    pub step_seconds: f64,
    pub horizon_minutes: f64,
    times: Vec<DateTime<Utc>>,
}

impl TimeGrid {
    /// Build a grid covering `horizon_minutes` starting at `base_epoch`,
    /// sampled every `step_seconds`. `step_seconds` must be positive and
    /// `horizon_minutes` must satisfy the constellation's minimum horizon.
    pub fn new(
        base_epoch: DateTime<Utc>,
        step_seconds: f64,
        horizon_minutes: f64,
        constellation: Constellation,
    ) -> Option<Self> {
        if step_seconds <= 0.0 || horizon_minutes <= 0.0 {
            return None;
        }
        if horizon_minutes < constellation.min_horizon_minutes() {
            return None;
        }

        let horizon_seconds = horizon_minutes * 60.0;
        let sample_count = (horizon_seconds / step_seconds).floor() as i64 + 1;
        let times = (0..sample_count)
            .map(|i| base_epoch + Duration::milliseconds((i as f64 * step_seconds * 1000.0) as i64))
            .collect();

        Some(Self {
            base_epoch,
            step_seconds,
            horizon_minutes,
            times,
        })
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Grid uniformity property from spec.md §8: adjacent samples differ by
    /// exactly `step_seconds`, within a microsecond.
    pub fn is_uniform(&self) -> bool {
        self.times.windows(2).all(|pair| {
            let delta = (pair[1] - pair[0]).num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0;
            (delta - self.step_seconds).abs() <= 1e-6
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starlink_95min_grid_has_at_least_190_samples() {
        let base = Utc::now();
        let grid = TimeGrid::new(base, 30.0, 95.0, Constellation::Starlink).unwrap();
        assert!(grid.len() >= 190, "expected >=190 samples, got {}", grid.len());
        assert!(grid.is_uniform());
    }

    #[test]
    fn oneweb_horizon_below_minimum_is_rejected() {
        let base = Utc::now();
        assert!(TimeGrid::new(base, 30.0, 50.0, Constellation::OneWeb).is_none());
    }

    #[test]
    fn non_positive_step_is_rejected() {
        let base = Utc::now();
        assert!(TimeGrid::new(base, 0.0, 100.0, Constellation::Starlink).is_none());
    }
}
