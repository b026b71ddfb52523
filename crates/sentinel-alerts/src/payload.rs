//! Alert payload construction.
//!
//! Builds the self-contained JSON object a webhook receiver gets for one
//! pipeline run: endpoint identity, run outcome, risk breakdown, and the
//! conditional anomaly/performance/drift sections.

use chrono::{SecondsFormat, Utc};
use sentinel_pipeline::PipelineResult;
use serde_json::{json, Value};

/// Build the webhook JSON payload from a completed pipeline result
pub fn build_alert_payload(pipeline: &PipelineResult) -> Value {
    let run = &pipeline.run;
    let risk = &pipeline.risk;

    let mut payload = json!({
        "event": "sentinel_alert",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),

        "endpoint": {
            "id": run.endpoint_id,
            "name": pipeline.endpoint_name,
            "url": pipeline.endpoint_url,
            "method": pipeline.endpoint_method.as_str(),
        },

        "run": {
            "id": run.id,
            "status_code": run.status_code,
            "response_time_ms": run.response_time_ms,
            "is_success": run.is_success,
            "error_message": run.error_message,
        },

        "risk": {
            "score": risk.calculated_score,
            "level": risk.risk_level.as_str(),
            "breakdown": {
                "status": risk.status_score,
                "performance": risk.performance_score,
                "drift": risk.drift_score,
                "ai": risk.ai_score,
                "history": risk.history_score,
            },
        },
    });
    if let Value::Object(root) = &mut payload {
        // Anomaly section only when a classified anomaly was detected
        if let Some(anomaly) = &pipeline.anomaly {
            if anomaly.anomaly_detected && (anomaly.ai_called || anomaly.used_fallback) {
                root.insert(
                    "anomaly".to_string(),
                    json!({
                        "severity_score": anomaly.severity_score,
                        "reasoning": anomaly.reasoning,
                        "probable_cause": anomaly.probable_cause,
                    }),
                );
            }
        }

        // Performance section only when a spike was detected
        if let Some(perf) = pipeline.performance.as_ref().filter(|p| p.is_spike) {
            root.insert(
                "performance".to_string(),
                json!({
                    "current_ms": perf.current_ms,
                    "avg_ms": perf.rolling_avg_ms,
                    "deviation_percent": perf.deviation_percent,
                    "is_critical_spike": perf.is_critical_spike,
                }),
            );
        }

        // Drift section carries the count only
        if pipeline.schema_drift.has_drift() {
            root.insert(
                "schema_drift".to_string(),
                json!({
                    "total_differences": pipeline.schema_drift.drift_count(),
                }),
            );
        }
    }

    payload
}
