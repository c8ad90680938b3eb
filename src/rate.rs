//! Production overview and windowed production-rate estimation.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::tracker::ClassCounts;

/// Length of one production window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Class index counted as accepted (non-defective) production.
pub const ACCEPTED_CLASS: usize = 0;

/// Dashboard summary derived from the cumulative class counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    /// Units counted since start.
    pub total: u64,
    /// Share of non-accepted units, in whole percent.
    pub defect_percent: u32,
    /// Units per hour over the last completed window; the running total
    /// until the first window completes.
    pub rate: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProductionWindow {
    pub window_start: Instant,
    pub count_at_window_start: u64,
    pub current_rate: u64,
}

pub struct RateEstimator {
    window: ProductionWindow,
    window_len: Duration,
    completed_windows: u64,
}

impl RateEstimator {
    pub fn new(start: Instant) -> Self {
        Self {
            window: ProductionWindow {
                window_start: start,
                count_at_window_start: 0,
                current_rate: 0,
            },
            window_len: DEFAULT_WINDOW,
            completed_windows: 0,
        }
    }

    pub fn with_window(start: Instant, window_len: Duration) -> Result<Self> {
        if window_len.is_zero() {
            return Err(anyhow!("production window must be longer than zero"));
        }
        let mut estimator = Self::new(start);
        estimator.window_len = window_len;
        Ok(estimator)
    }

    pub fn window(&self) -> &ProductionWindow {
        &self.window
    }

    pub fn is_warming_up(&self) -> bool {
        self.completed_windows == 0
    }

    pub fn update(&mut self, counts: &ClassCounts, now: Instant) -> Overview {
        let total = counts.total();
        let elapsed = now.saturating_duration_since(self.window.window_start);

        if elapsed > self.window_len && !elapsed.is_zero() {
            let produced = total.saturating_sub(self.window.count_at_window_start);
            let rate = (produced as f64 / elapsed.as_secs_f64() * 3600.0).floor() as u64;
            log::debug!(
                "production window closed: {} units in {:.1}s -> {} units/h",
                produced,
                elapsed.as_secs_f64(),
                rate
            );
            self.window = ProductionWindow {
                window_start: now,
                count_at_window_start: total,
                current_rate: rate,
            };
            self.completed_windows += 1;
        } else if self.is_warming_up() {
            self.window.current_rate = total;
        }

        Overview {
            total,
            defect_percent: defect_percent(counts.as_slice(), total),
            rate: self.window.current_rate,
        }
    }
}

/// Non-accepted share in whole percent, rounded half to even.
fn defect_percent(counts: &[u64], total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let accepted = counts.get(ACCEPTED_CLASS).copied().unwrap_or(0);
    let defects = total.saturating_sub(accepted);
    (defects as f64 / total as f64 * 100.0).round_ties_even() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warm_up_reports_total_as_rate() {
        let start = Instant::now();
        let mut rate = RateEstimator::new(start);
        let counts = ClassCounts::from(vec![3, 1]);
        for secs in [0, 10, 59, 60] {
            let overview = rate.update(&counts, start + Duration::from_secs(secs));
            assert_eq!(overview.rate, 4);
        }
        assert!(rate.is_warming_up());
    }

    #[test]
    fn rate_is_units_per_hour_over_window() {
        let start = Instant::now();
        let mut rate = RateEstimator::new(start);
        let overview = rate.update(&ClassCounts::from(vec![10]), start + Duration::from_secs(61));
        assert_eq!(overview.rate, 590);
        assert!(!rate.is_warming_up());
        assert_eq!(rate.window().count_at_window_start, 10);
    }

    #[test]
    fn rate_holds_between_windows() {
        let start = Instant::now();
        let mut rate = RateEstimator::new(start);
        rate.update(&ClassCounts::from(vec![10]), start + Duration::from_secs(61));
        let overview = rate.update(&ClassCounts::from(vec![25]), start + Duration::from_secs(90));
        assert_eq!(overview.rate, 590);
        assert_eq!(overview.total, 25);
        // second window: 30 units over 62s
        let overview = rate.update(&ClassCounts::from(vec![40]), start + Duration::from_secs(123));
        assert_eq!(overview.rate, (30.0_f64 / 62.0 * 3600.0).floor() as u64);
    }

    #[test]
    fn repeated_clock_value_is_a_no_op() {
        let start = Instant::now();
        let mut rate = RateEstimator::new(start);
        let counts = ClassCounts::from(vec![2]);
        let a = rate.update(&counts, start);
        let b = rate.update(&counts, start);
        assert_eq!(a, b);
        assert_eq!(b.rate, 2);
    }

    #[test]
    fn defect_percent_rounds_half_to_even() {
        assert_eq!(defect_percent(&[0, 0], 0), 0);
        assert_eq!(defect_percent(&[7, 1], 8), 12);
        assert_eq!(defect_percent(&[1, 1], 2), 50);
        assert_eq!(defect_percent(&[1, 2], 3), 67);
        assert_eq!(defect_percent(&[0, 5], 5), 100);
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(RateEstimator::with_window(Instant::now(), Duration::ZERO).is_err());
    }
}
