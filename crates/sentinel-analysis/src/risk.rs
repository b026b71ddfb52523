//! Deterministic risk scoring.
//!
//! Aggregates every upstream pipeline signal into a single composite score
//! (0–100) with a bucketed risk level. This is the last analysis step of
//! the pipeline; same inputs always produce the same score.

use crate::performance::PerformanceSnapshot;
use crate::schema_diff::DriftAnalysis;
use sentinel_common::{AnomalyAssessment, RiskLevel};
use serde::Serialize;

/// Immutable output from the risk engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskResult {
    pub calculated_score: f64,
    pub risk_level: RiskLevel,
    pub status_score: f64,
    pub performance_score: f64,
    pub drift_score: f64,
    pub ai_score: f64,
    pub history_score: f64,
}

/// Stateless, deterministic risk scorer with a weighted composite model.
/// The component weights sum to 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskEngine;

impl RiskEngine {
    pub const W_STATUS: f64 = 35.0;
    pub const W_PERFORMANCE: f64 = 25.0;
    pub const W_DRIFT: f64 = 20.0;
    pub const W_AI: f64 = 15.0;
    pub const W_HISTORY: f64 = 5.0;

    /// Deviation at or beyond this percentage saturates the performance component
    const PERF_MAX_DEVIATION: f64 = 300.0;
    /// This many diffs saturate the drift component
    const DRIFT_MAX_DIFFS: f64 = 10.0;
    /// Failure rate at or beyond this percentage saturates the history component
    const HISTORY_MAX_RATE: f64 = 50.0;

    /// Compute the composite risk score from pipeline signals. Never fails.
    pub fn score(
        &self,
        is_success: bool,
        performance: Option<&PerformanceSnapshot>,
        drift: &DriftAnalysis,
        anomaly: Option<&AnomalyAssessment>,
        failure_rate_percent: f64,
    ) -> RiskResult {
        let status_score = if is_success { 0.0 } else { Self::W_STATUS };

        // Only positive deviations (slower than average) count as risk
        let mut performance_score = 0.0;
        if let Some(perf) = performance {
            if let Some(deviation) = perf.deviation_percent {
                if deviation > 0.0 {
                    let ratio = clamp(deviation.abs() / Self::PERF_MAX_DEVIATION, 0.0, 1.0);
                    performance_score = ratio * Self::W_PERFORMANCE;
                    if perf.is_critical_spike {
                        performance_score = Self::W_PERFORMANCE;
                    }
                }
            }
        }

        let mut drift_score = 0.0;
        if drift.has_drift() {
            let ratio = clamp(drift.drift_count() as f64 / Self::DRIFT_MAX_DIFFS, 0.0, 1.0);
            drift_score = ratio * Self::W_DRIFT;
        }

        let mut ai_score = 0.0;
        if let Some(anomaly) = anomaly {
            if anomaly.anomaly_detected && (anomaly.ai_called || anomaly.used_fallback) {
                ai_score = anomaly.severity_score / 100.0 * Self::W_AI;
            }
        }

        let mut history_score = 0.0;
        if failure_rate_percent > 0.0 {
            let ratio = clamp(failure_rate_percent / Self::HISTORY_MAX_RATE, 0.0, 1.0);
            history_score = ratio * Self::W_HISTORY;
        }

        let total = round1(clamp(
            status_score + performance_score + drift_score + ai_score + history_score,
            0.0,
            100.0,
        ));

        RiskResult {
            calculated_score: total,
            risk_level: RiskLevel::from_score(total),
            status_score: round1(status_score),
            performance_score: round1(performance_score),
            drift_score: round1(drift_score),
            ai_score: round1(ai_score),
            history_score: round1(history_score),
        }
    }
}

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
