//! Cost-gated anomaly classification.
//!
//! The gate is the first action: when no signal is raised (failure, error,
//! spike, drift) the model is never consulted and a healthy assessment is
//! returned at zero cost. When signals exist, the model gateway is asked
//! and its JSON reply parsed leniently; if the gateway is unavailable or
//! comes back empty, a deterministic rule-based scorer produces the
//! assessment instead. Users always receive a classified result.

use crate::gateway::LlmGateway;
use crate::prompts::{build_user_prompt, PromptContext, SYSTEM_PROMPT};
use sentinel_analysis::{DriftAnalysis, PerformanceSnapshot};
use sentinel_common::{AnomalyAssessment, HttpMethod};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Severity at or above which the fallback flags an anomaly
const FALLBACK_DETECTION_THRESHOLD: f64 = 20.0;

/// Everything the classifier needs to know about one run
pub struct ClassifyContext<'a> {
    pub endpoint_name: &'a str,
    pub url: &'a str,
    pub method: HttpMethod,
    pub expected_status: u16,
    pub actual_status: Option<u16>,
    pub response_time_ms: Option<f64>,
    pub is_success: bool,
    pub error_message: Option<&'a str>,
    pub performance: Option<&'a PerformanceSnapshot>,
    pub drift: &'a DriftAnalysis,
    pub failure_rate_percent: f64,
}

impl ClassifyContext<'_> {
    fn has_error(&self) -> bool {
        self.error_message.map(|m| !m.is_empty()).unwrap_or(false)
    }

    fn is_spike(&self) -> bool {
        self.performance.map(|p| p.is_spike).unwrap_or(false)
    }

    fn is_critical_spike(&self) -> bool {
        self.performance.map(|p| p.is_critical_spike).unwrap_or(false)
    }
}

/// Decides whether an anomaly exists for a run. Never fails; every failure
/// mode becomes the fallback path.
pub struct AnomalyClassifier {
    gateway: Option<Arc<LlmGateway>>,
}

impl AnomalyClassifier {
    pub fn new(gateway: Option<Arc<LlmGateway>>) -> Self {
        AnomalyClassifier { gateway }
    }

    pub async fn classify(&self, ctx: &ClassifyContext<'_>) -> AnomalyAssessment {
        // Cost gate: healthy runs consume zero gateway resources
        if !should_analyse(ctx) {
            debug!(
                "All signals healthy — analysis skipped for {}",
                ctx.endpoint_name
            );
            return AnomalyAssessment::no_anomaly();
        }

        let gateway = match &self.gateway {
            Some(gateway) if gateway.is_available().await => gateway,
            _ => {
                info!(
                    "Model gateway unavailable for {} — using rule-based fallback",
                    ctx.endpoint_name
                );
                return fallback_assessment(ctx);
            }
        };

        let user_prompt = build_user_prompt(&PromptContext {
            endpoint_name: ctx.endpoint_name,
            url: ctx.url,
            method: ctx.method.as_str(),
            expected_status: ctx.expected_status,
            actual_status: ctx.actual_status,
            response_time_ms: ctx.response_time_ms,
            avg_response_time_ms: ctx.performance.and_then(|p| p.rolling_avg_ms),
            deviation_percent: ctx.performance.and_then(|p| p.deviation_percent),
            failure_rate_percent: ctx.failure_rate_percent,
            error_message: ctx.error_message,
            drift: ctx.drift.diff.as_ref(),
        });

        info!("Calling model for anomaly analysis on {}", ctx.endpoint_name);
        match gateway.analyse(SYSTEM_PROMPT, &user_prompt).await {
            Some(raw) => parse_model_response(&raw),
            None => {
                warn!(
                    "Model returned no result for {} — using rule-based fallback",
                    ctx.endpoint_name
                );
                fallback_assessment(ctx)
            }
        }
    }
}

/// True when any signal warrants analysis
fn should_analyse(ctx: &ClassifyContext<'_>) -> bool {
    !ctx.is_success || ctx.has_error() || ctx.is_spike() || ctx.drift.has_drift()
}

/// Parse the model's JSON reply into an assessment.
/// Tolerant of missing or malformed fields: numerics are coerced and
/// clamped, strings default to empty.
fn parse_model_response(raw: &Map<String, Value>) -> AnomalyAssessment {
    AnomalyAssessment {
        anomaly_detected: raw
            .get("anomaly_detected")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        severity_score: coerce_f64(raw.get("severity_score"), 50.0).clamp(0.0, 100.0),
        confidence: coerce_f64(raw.get("confidence"), 0.5).clamp(0.0, 1.0),
        reasoning: coerce_string(raw.get("reasoning")),
        probable_cause: coerce_string(raw.get("probable_cause")),
        recommendation: coerce_string(raw.get("recommendation")),
        ai_called: true,
        used_fallback: false,
        skipped_reason: None,
    }
}

fn coerce_f64(value: Option<&Value>, default: f64) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn coerce_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => String::new(),
    }
}

/// Deterministic rule-based scoring: additive severity per condition,
/// clamped to [0, 100].
fn fallback_assessment(ctx: &ClassifyContext<'_>) -> AnomalyAssessment {
    let mut severity: f64 = 0.0;
    let mut reasons: Vec<String> = Vec::new();
    let mut recommendations: Vec<&str> = Vec::new();

    match ctx.actual_status {
        None => {
            severity += 60.0;
            reasons.push("request failed without an HTTP response".to_string());
            recommendations.push("Check endpoint availability and DNS resolution");
        }
        Some(status) if status >= 500 => {
            severity += 50.0;
            reasons.push(format!("server error status {status}"));
            recommendations.push("Inspect server logs for the failing service");
        }
        Some(status) if status >= 400 && !ctx.is_success => {
            severity += 25.0;
            reasons.push(format!("client error status {status}"));
            recommendations.push("Verify endpoint configuration and credentials");
        }
        _ => {}
    }

    if let Some(error) = ctx.error_message {
        let lowered = error.to_lowercase();
        if lowered.contains("timeout") {
            severity += 20.0;
            reasons.push("request timed out".to_string());
        }
        if lowered.contains("connection") {
            severity += 30.0;
            reasons.push("connection failure".to_string());
        }
    }

    if ctx.is_critical_spike() {
        severity += 35.0;
        reasons.push("critical response time spike".to_string());
        recommendations.push("Profile the endpoint and check resource saturation");
    } else if ctx.is_spike() {
        severity += 20.0;
        reasons.push("response time spike".to_string());
    }

    let drift_count = ctx.drift.drift_count();
    if drift_count >= 5 {
        severity += 25.0;
        reasons.push(format!("{drift_count} schema differences"));
        recommendations.push("Review the API changelog for breaking changes");
    } else if drift_count >= 1 {
        severity += 10.0;
        reasons.push(format!("{drift_count} schema difference(s)"));
    }

    if ctx.failure_rate_percent >= 30.0 {
        severity += 15.0;
        reasons.push(format!(
            "historical failure rate {:.1}%",
            ctx.failure_rate_percent
        ));
        recommendations.push("Investigate recurring failures for this endpoint");
    }

    severity = severity.clamp(0.0, 100.0);
    let detected = severity >= FALLBACK_DETECTION_THRESHOLD;

    AnomalyAssessment {
        anomaly_detected: detected,
        severity_score: severity,
        confidence: if detected { 0.6 } else { 0.8 },
        reasoning: if reasons.is_empty() {
            "no failure conditions matched".to_string()
        } else {
            format!("Rule-based analysis: {}", reasons.join("; "))
        },
        probable_cause: reasons.first().cloned().unwrap_or_default(),
        recommendation: recommendations.join("; "),
        ai_called: false,
        used_fallback: true,
        skipped_reason: None,
    }
}
