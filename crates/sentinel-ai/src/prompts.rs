//! Prompt templates for the anomaly classifier.
//!
//! The system prompt fixes the role, output shape, and the severity and
//! confidence calibration scales; the user prompt is built from pipeline
//! data. Both are plain strings.

use sentinel_analysis::schema_diff::SchemaDiffResult;

pub const SYSTEM_PROMPT: &str = r#"You are an API reliability intelligence engine for Sentinel.

Your job is to analyse API execution summaries and determine whether
an anomaly exists.  You assess severity, provide concise technical
reasoning, and suggest the most probable root cause.

RULES:
- Be concise and technical.  No filler.
- If everything looks normal, set anomaly_detected to false and severity_score to 0.
- Focus on actionable insights a backend engineer can act on.
- NEVER hallucinate anomalies.  If data is ambiguous, lean toward "no anomaly".
- Always include your confidence level (0.0 to 1.0) in the analysis.

SEVERITY SCALE (0-100):
  0      = Perfectly healthy.  No issues.
  1-15   = Minor observation.  Not actionable.  (e.g., 5% latency increase)
  16-39  = Low severity.  Worth noting.  (e.g., occasional 4xx from client, small latency bump)
  40-59  = Medium severity.  Investigate.  (e.g., sustained latency increase 50%+, intermittent 5xx)
  60-79  = High severity.  Act soon.  (e.g., frequent 5xx, response time doubled, schema breaking changes)
  80-100 = Critical.  Act now.  (e.g., endpoint completely down, 100% failures, data corruption)

CONFIDENCE SCALE (0.0-1.0):
  0.0-0.3 = Low confidence - limited data, uncertain analysis
  0.4-0.6 = Moderate confidence - some signals present
  0.7-0.8 = High confidence - clear signals
  0.9-1.0 = Very high confidence - definitive evidence

Respond ONLY with a JSON object in this exact shape:
{
  "anomaly_detected": boolean,
  "severity_score": number,
  "reasoning": "string - concise technical explanation",
  "probable_cause": "string - most likely root cause",
  "confidence": number,
  "recommendation": "string - specific action to take"
}"#;

/// Inputs rendered into the user prompt
pub struct PromptContext<'a> {
    pub endpoint_name: &'a str,
    pub url: &'a str,
    pub method: &'a str,
    pub expected_status: u16,
    pub actual_status: Option<u16>,
    pub response_time_ms: Option<f64>,
    pub avg_response_time_ms: Option<f64>,
    pub deviation_percent: Option<f64>,
    pub failure_rate_percent: f64,
    pub error_message: Option<&'a str>,
    pub drift: Option<&'a SchemaDiffResult>,
}

/// Build the user prompt from monitoring pipeline data.
/// Missing values render as "N/A".
pub fn build_user_prompt(ctx: &PromptContext<'_>) -> String {
    let mut lines = vec![
        "Analyse the following API execution summary:".to_string(),
        String::new(),
        format!("Endpoint: {}", ctx.endpoint_name),
        format!("URL: {} {}", ctx.method, ctx.url),
        format!("Expected Status: {}", ctx.expected_status),
        format!(
            "Actual Status: {}",
            ctx.actual_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A (request failed)".to_string())
        ),
        format!("Response Time: {}", fmt_ms(ctx.response_time_ms)),
        format!("Average Response Time: {}", fmt_ms(ctx.avg_response_time_ms)),
        format!("Performance Deviation: {}", fmt_pct(ctx.deviation_percent)),
        format!("Historical Failure Rate: {:.1}%", ctx.failure_rate_percent),
    ];

    if let Some(error) = ctx.error_message {
        if !error.is_empty() {
            lines.push(format!("Error: {error}"));
        }
    }

    match ctx.drift.filter(|d| d.has_drift()) {
        Some(diff) => lines.push(format!("Schema Differences: {}", summarize_drift(diff))),
        None => lines.push("Schema Differences: None".to_string()),
    }

    lines.extend([
        String::new(),
        "Tasks:".to_string(),
        "1. Determine if a genuine anomaly exists (NOT minor fluctuations).".to_string(),
        "2. Provide a severity score (0-100) calibrated to the scale above.".to_string(),
        "3. Provide concise technical reasoning.".to_string(),
        "4. Suggest the most probable root cause.".to_string(),
        "5. Provide a confidence score (0.0-1.0).".to_string(),
        "6. Suggest a specific recommended action.".to_string(),
    ]);

    lines.join("\n")
}

fn fmt_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("{ms:.1} ms"),
        None => "N/A".to_string(),
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(pct) => format!("{pct:+.1}%"),
        None => "N/A".to_string(),
    }
}

/// Compact drift summary for the prompt: at most five paths per category
fn summarize_drift(diff: &SchemaDiffResult) -> String {
    let mut parts = vec![format!("{} difference(s)", diff.total_differences)];

    if !diff.missing_fields.is_empty() {
        let paths: Vec<&str> = diff
            .missing_fields
            .iter()
            .take(5)
            .map(|d| d.path.as_str())
            .collect();
        parts.push(format!("missing: [{}]", paths.join(", ")));
    }

    if !diff.new_fields.is_empty() {
        let paths: Vec<&str> = diff
            .new_fields
            .iter()
            .take(5)
            .map(|d| d.path.as_str())
            .collect();
        parts.push(format!("new: [{}]", paths.join(", ")));
    }

    if !diff.type_mismatches.is_empty() {
        let items: Vec<String> = diff
            .type_mismatches
            .iter()
            .take(5)
            .map(|d| {
                format!(
                    "{} ({}\u{2192}{})",
                    d.path,
                    d.expected_type.as_deref().unwrap_or("?"),
                    d.actual_type.as_deref().unwrap_or("?"),
                )
            })
            .collect();
        parts.push(format!("type changes: [{}]", items.join(", ")));
    }

    parts.join("; ")
}
