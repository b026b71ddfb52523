//! Rolling performance analysis.
//!
//! Computes rolling mean/median/standard deviation over the most recent
//! response times and classifies the current sample as a spike when it
//! deviates far enough from the rolling average. Pure computation: the
//! caller supplies pre-fetched history, newest first, excluding the
//! current sample.

use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_WINDOW_SIZE: usize = 20;
pub const SPIKE_THRESHOLD_PERCENT: f64 = 50.0;
pub const CRITICAL_SPIKE_THRESHOLD_PERCENT: f64 = 150.0;

/// Minimum history for deviation and spike classification
const MIN_SAMPLES_FOR_ANALYSIS: usize = 3;

/// Immutable performance analysis for a single run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub current_ms: f64,
    pub rolling_avg_ms: Option<f64>,
    pub rolling_median_ms: Option<f64>,
    pub rolling_stddev_ms: Option<f64>,
    pub deviation_percent: Option<f64>,
    pub is_spike: bool,
    pub is_critical_spike: bool,
    pub sample_size: usize,
}

impl PerformanceSnapshot {
    /// At least three data points are needed for meaningful analysis
    pub fn has_enough_data(&self) -> bool {
        self.sample_size >= MIN_SAMPLES_FOR_ANALYSIS
    }
}

/// Stateless performance analyzer.
///
/// Takes a list of historical response times and the current run time,
/// returns a [`PerformanceSnapshot`] with rolling stats and spike flags.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    window_size: usize,
    spike_threshold: f64,
    critical_spike_threshold: f64,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        PerformanceTracker {
            window_size: DEFAULT_WINDOW_SIZE,
            spike_threshold: SPIKE_THRESHOLD_PERCENT,
            critical_spike_threshold: CRITICAL_SPIKE_THRESHOLD_PERCENT,
        }
    }
}

impl PerformanceTracker {
    pub fn new(window_size: usize, spike_threshold: f64, critical_spike_threshold: f64) -> Self {
        PerformanceTracker {
            window_size,
            spike_threshold,
            critical_spike_threshold,
        }
    }

    /// Analyze the current run against historical data.
    ///
    /// `historical_times` is newest first and excludes the current run; the
    /// repository already limits it, but the window is enforced here too.
    pub fn analyze(&self, current_ms: f64, historical_times: &[f64]) -> PerformanceSnapshot {
        let window = &historical_times[..historical_times.len().min(self.window_size)];
        let sample_size = window.len();

        if sample_size < 2 {
            return PerformanceSnapshot {
                current_ms,
                rolling_avg_ms: window.first().copied(),
                rolling_median_ms: window.first().copied(),
                rolling_stddev_ms: None,
                deviation_percent: None,
                is_spike: false,
                is_critical_spike: false,
                sample_size,
            };
        }

        let rolling_avg = mean(window);
        let rolling_median = median(window);
        let rolling_stddev = sample_stddev(window, rolling_avg);

        if sample_size < MIN_SAMPLES_FOR_ANALYSIS {
            return PerformanceSnapshot {
                current_ms: round2(current_ms),
                rolling_avg_ms: Some(round2(rolling_avg)),
                rolling_median_ms: Some(round2(rolling_median)),
                rolling_stddev_ms: Some(round2(rolling_stddev)),
                deviation_percent: None,
                is_spike: false,
                is_critical_spike: false,
                sample_size,
            };
        }

        let deviation_pct = if rolling_avg > 0.0 {
            round2((current_ms - rolling_avg) / rolling_avg * 100.0)
        } else {
            0.0
        };

        let is_spike = deviation_pct >= self.spike_threshold;
        let is_critical = deviation_pct >= self.critical_spike_threshold;

        if is_critical {
            warn!(
                "CRITICAL spike: {:.1} ms vs avg {:.1} ms ({:.1}% deviation)",
                current_ms, rolling_avg, deviation_pct
            );
        } else if is_spike {
            info!(
                "Performance spike: {:.1} ms vs avg {:.1} ms ({:.1}% deviation)",
                current_ms, rolling_avg, deviation_pct
            );
        }

        PerformanceSnapshot {
            current_ms: round2(current_ms),
            rolling_avg_ms: Some(round2(rolling_avg)),
            rolling_median_ms: Some(round2(rolling_median)),
            rolling_stddev_ms: Some(round2(rolling_stddev)),
            deviation_percent: Some(deviation_pct),
            is_spike,
            is_critical_spike: is_critical,
            sample_size,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation (n − 1 denominator)
fn sample_stddev(values: &[f64], mean: f64) -> f64 {
    let variance = values
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
