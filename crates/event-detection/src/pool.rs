//! Candidate pool verification: the statistical health checks spec.md §4.6
//! runs over the whole candidate pool once event detection is complete,
//! independent of any single trigger. Run once per constellation — the
//! target visible-count band and theoretical orbital period both depend on
//! which constellation's candidates are being checked.

use chrono::{DateTime, Utc};
use pipeline_core::Constellation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolVerification {
    pub mean_visible_count: f64,
    /// Fraction of time steps whose visible count falls within the
    /// constellation's target band (Starlink 10-15, OneWeb 3-6).
    pub coverage_rate: f64,
    /// `(max_timestamp − min_timestamp) / theoretical_orbital_period`.
    pub orbital_period_coverage_ratio: f64,
    /// `max inter-sample gap / mean inter-sample gap`; passes at <= 3.0.
    pub time_distribution_uniformity: f64,
    pub visibility_window_continuity_ok: bool,
    pub overall_pass: bool,
}

const MIN_CONTINUOUS_WINDOW_MINUTES: f64 = 5.0;
const MIN_ORBITAL_PERIOD_COVERAGE_RATIO: f64 = 0.9;
const MIN_COVERAGE_RATE: f64 = 0.95;
const MAX_GAP_TO_MEAN_GAP_RATIO: f64 = 3.0;

fn empty_verification() -> PoolVerification {
    PoolVerification {
        mean_visible_count: 0.0,
        coverage_rate: 0.0,
        orbital_period_coverage_ratio: 0.0,
        time_distribution_uniformity: f64::INFINITY,
        visibility_window_continuity_ok: false,
        overall_pass: false,
    }
}

/// `connectable_by_time[i]` is the set of connectable flags, one per
/// candidate satellite, at time index `i`; `orbital_periods_minutes` holds
/// each of those same satellites' theoretical orbital period
/// (`1440 / mean_motion`, from Stage 2).
pub fn verify_pool(
    times: &[DateTime<Utc>],
    connectable_by_time: &[Vec<bool>],
    orbital_periods_minutes: &[f64],
    constellation: Constellation,
) -> PoolVerification {
    if times.is_empty() || connectable_by_time.is_empty() {
        return empty_verification();
    }

    let (target_lo, target_hi) = constellation.target_visible_band();

    let visible_counts: Vec<usize> = connectable_by_time.iter().map(|flags| flags.iter().filter(|v| **v).count()).collect();
    let mean_visible_count = visible_counts.iter().sum::<usize>() as f64 / visible_counts.len() as f64;
    let mean_in_band = mean_visible_count >= target_lo as f64 && mean_visible_count <= target_hi as f64;

    let in_band_samples = visible_counts
        .iter()
        .filter(|&&c| c >= target_lo as usize && c <= target_hi as usize)
        .count();
    let coverage_rate = in_band_samples as f64 / visible_counts.len() as f64;

    let observed_span_minutes = (*times.last().unwrap() - *times.first().unwrap()).num_seconds() as f64 / 60.0;
    let theoretical_period_minutes = if orbital_periods_minutes.is_empty() {
        0.0
    } else {
        orbital_periods_minutes.iter().sum::<f64>() / orbital_periods_minutes.len() as f64
    };
    let orbital_period_coverage_ratio = if theoretical_period_minutes > 0.0 {
        observed_span_minutes / theoretical_period_minutes
    } else {
        0.0
    };
    let orbital_period_ok = orbital_period_coverage_ratio >= MIN_ORBITAL_PERIOD_COVERAGE_RATIO;

    let gaps_seconds: Vec<f64> = times.windows(2).map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0).collect();
    let mean_gap_seconds = if gaps_seconds.is_empty() {
        0.0
    } else {
        gaps_seconds.iter().sum::<f64>() / gaps_seconds.len() as f64
    };
    let max_gap_seconds = gaps_seconds.iter().cloned().fold(0.0_f64, f64::max);
    let time_distribution_uniformity = if mean_gap_seconds > 0.0 {
        max_gap_seconds / mean_gap_seconds
    } else {
        f64::INFINITY
    };
    let time_distribution_ok = mean_gap_seconds > 0.0 && max_gap_seconds <= MAX_GAP_TO_MEAN_GAP_RATIO * mean_gap_seconds;

    let step_seconds = if mean_gap_seconds > 0.0 { mean_gap_seconds } else { 1.0 };
    let min_window_samples = (MIN_CONTINUOUS_WINDOW_MINUTES * 60.0 / step_seconds).ceil() as usize;
    let satellite_count = connectable_by_time.first().map(|f| f.len()).unwrap_or(0);
    let visibility_window_continuity_ok =
        (0..satellite_count).any(|sat_index| longest_connectable_run(connectable_by_time, sat_index) >= min_window_samples);

    let overall_pass = mean_in_band
        && orbital_period_ok
        && time_distribution_ok
        && visibility_window_continuity_ok
        && coverage_rate >= MIN_COVERAGE_RATE;

    PoolVerification {
        mean_visible_count,
        coverage_rate,
        orbital_period_coverage_ratio,
        time_distribution_uniformity,
        visibility_window_continuity_ok,
        overall_pass,
    }
}

fn longest_connectable_run(connectable_by_time: &[Vec<bool>], sat_index: usize) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for flags in connectable_by_time {
        if flags.get(sat_index).copied().unwrap_or(false) {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn times(count: usize, step_seconds: i64) -> Vec<DateTime<Utc>> {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        (0..count).map(|i| base + Duration::seconds(i as i64 * step_seconds)).collect()
    }

    #[test]
    fn continuous_visibility_in_band_passes_every_sub_check() {
        let times = times(240, 30);
        // 240 samples at 30s is a 2-hour span, comfortably above 90% of a
        // ~95-minute Starlink period.
        let connectable: Vec<Vec<bool>> = (0..240).map(|_| vec![true; 12]).collect();
        let periods = vec![95.0; 12];
        let verification = verify_pool(&times, &connectable, &periods, Constellation::Starlink);
        assert!(verification.visibility_window_continuity_ok);
        assert!(verification.coverage_rate > 0.99);
        assert!(verification.orbital_period_coverage_ratio >= 0.9);
        assert!(verification.time_distribution_uniformity <= 3.0);
        assert!(verification.overall_pass);
    }

    #[test]
    fn no_visibility_fails_overall() {
        let times = times(240, 30);
        let connectable: Vec<Vec<bool>> = (0..240).map(|_| vec![false; 12]).collect();
        let periods = vec![95.0; 12];
        let verification = verify_pool(&times, &connectable, &periods, Constellation::Starlink);
        assert!(!verification.overall_pass);
        assert_eq!(verification.coverage_rate, 0.0);
    }

    #[test]
    fn visible_count_outside_target_band_fails_coverage_rate() {
        let times = times(240, 30);
        // Only 2 visible at a time: below Starlink's 10-15 band.
        let connectable: Vec<Vec<bool>> = (0..240)
            .map(|_| {
                let mut flags = vec![false; 12];
                flags[0] = true;
                flags[1] = true;
                flags
            })
            .collect();
        let periods = vec![95.0; 12];
        let verification = verify_pool(&times, &connectable, &periods, Constellation::Starlink);
        assert_eq!(verification.coverage_rate, 0.0);
        assert!(!verification.overall_pass);
    }

    #[test]
    fn uneven_sampling_fails_time_distribution_uniformity() {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let times = vec![
            base,
            base + Duration::seconds(30),
            base + Duration::seconds(60),
            base + Duration::seconds(600),
        ];
        let connectable: Vec<Vec<bool>> = (0..4).map(|_| vec![true; 12]).collect();
        let periods = vec![95.0; 12];
        let verification = verify_pool(&times, &connectable, &periods, Constellation::Starlink);
        assert!(verification.time_distribution_uniformity > 3.0);
        assert!(!verification.overall_pass);
    }
}
