//! Common types for the Sentinel monitoring pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for monitored endpoints
pub type EndpointId = Uuid;

/// Unique identifier for tenants (the organizational owner of an endpoint)
pub type TenantId = Uuid;

/// Unique identifier for runs
pub type RunId = Uuid;

/// HTTP methods supported by monitored endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }

    /// Whether requests with this method may carry a body
    pub fn allows_body(&self) -> bool {
        !matches!(self, HttpMethod::GET | HttpMethod::HEAD)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::GET),
            "POST" => Ok(HttpMethod::POST),
            "PUT" => Ok(HttpMethod::PUT),
            "PATCH" => Ok(HttpMethod::PATCH),
            "DELETE" => Ok(HttpMethod::DELETE),
            "HEAD" => Ok(HttpMethod::HEAD),
            "OPTIONS" => Ok(HttpMethod::OPTIONS),
            other => Err(crate::Error::Configuration(format!(
                "unsupported HTTP method: {other}"
            ))),
        }
    }
}

/// One entry of an ordered key/value sequence (query params, headers, cookies,
/// form fields). Disabled entries are kept for round-tripping but skipped when
/// the effective request is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }

    /// An entry participates in the request when enabled and non-blank
    pub fn is_active(&self) -> bool {
        self.enabled && !self.key.trim().is_empty()
    }
}

/// Where an API key credential is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
}

impl Default for ApiKeyLocation {
    fn default() -> Self {
        ApiKeyLocation::Header
    }
}

/// Authentication configuration for a monitored endpoint.
/// At most one auth type is active per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AuthConfig {
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    ApiKey {
        key: String,
        value: String,
        #[serde(default)]
        add_to: ApiKeyLocation,
    },
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig::None
    }
}

/// Request body configuration for a monitored endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BodyConfig {
    None,
    Json {
        raw: String,
    },
    Urlencoded {
        #[serde(default)]
        form_fields: Vec<KeyValue>,
    },
    FormData {
        #[serde(default)]
        form_fields: Vec<KeyValue>,
    },
}

impl Default for BodyConfig {
    fn default() -> Self {
        BodyConfig::None
    }
}

/// A monitored HTTP endpoint: the contract the pipeline checks on a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub id: EndpointId,
    pub tenant_id: TenantId,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub expected_status: u16,
    /// Structural exemplar for the response body, compared by the schema
    /// diff engine when present
    pub expected_schema: Option<serde_json::Value>,
    pub query_params: Option<Vec<KeyValue>>,
    pub request_headers: Option<Vec<KeyValue>>,
    pub cookies: Option<Vec<KeyValue>>,
    pub auth: Option<AuthConfig>,
    pub body: Option<BodyConfig>,
    pub interval_seconds: u32,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of one execution of an endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub endpoint_id: EndpointId,
    pub tenant_id: TenantId,
    pub started_at: DateTime<Utc>,
    /// Absent when the request never produced an HTTP response
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
    /// Captured JSON body; non-object payloads are wrapped as `{"_value": …}`
    pub response_body: Option<serde_json::Value>,
    pub is_success: bool,
    pub error_message: Option<String>,
}

/// Output of the anomaly classifier for a single run.
///
/// Transient pipeline value; persisted as an [`AnomalyRecord`] only when
/// `anomaly_detected` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAssessment {
    pub anomaly_detected: bool,
    /// 0–100
    pub severity_score: f64,
    /// 0.0–1.0
    pub confidence: f64,
    pub reasoning: String,
    pub probable_cause: String,
    pub recommendation: String,
    /// The model provider was actually invoked for this assessment
    pub ai_called: bool,
    /// The deterministic rule-based path produced this assessment
    pub used_fallback: bool,
    pub skipped_reason: Option<String>,
}

impl AnomalyAssessment {
    /// Healthy-run sentinel: no signals were raised, so classification was
    /// skipped without spending gateway resources.
    pub fn no_anomaly() -> Self {
        AnomalyAssessment {
            anomaly_detected: false,
            severity_score: 0.0,
            confidence: 1.0,
            reasoning: String::new(),
            probable_cause: String::new(),
            recommendation: String::new(),
            ai_called: false,
            used_fallback: false,
            skipped_reason: Some("All signals healthy — analysis skipped".to_string()),
        }
    }
}

/// Persisted anomaly row, owned by its run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub id: Uuid,
    pub run_id: RunId,
    pub anomaly_detected: bool,
    pub severity_score: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub probable_cause: String,
    pub recommendation: String,
    pub ai_called: bool,
    pub used_fallback: bool,
    pub created_at: DateTime<Utc>,
}

impl AnomalyRecord {
    pub fn from_assessment(run_id: RunId, assessment: &AnomalyAssessment) -> Self {
        AnomalyRecord {
            id: Uuid::new_v4(),
            run_id,
            anomaly_detected: assessment.anomaly_detected,
            severity_score: assessment.severity_score,
            confidence: assessment.confidence,
            reasoning: assessment.reasoning.clone(),
            probable_cause: assessment.probable_cause.clone(),
            recommendation: assessment.recommendation.clone(),
            ai_called: assessment.ai_called,
            used_fallback: assessment.used_fallback,
            created_at: Utc::now(),
        }
    }
}

/// Risk level buckets, ranked LOW < MEDIUM < HIGH < CRITICAL
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    /// Bucket a composite score (0–100) into its level
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            RiskLevel::Critical
        } else if score >= 50.0 {
            RiskLevel::High
        } else if score >= 25.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            "CRITICAL" => Ok(RiskLevel::Critical),
            other => Err(crate::Error::Configuration(format!(
                "unknown risk level: {other}"
            ))),
        }
    }
}

/// Persisted risk row, owned by its run. One is written for every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRecord {
    pub id: Uuid,
    pub run_id: RunId,
    pub calculated_score: f64,
    pub risk_level: RiskLevel,
    pub status_score: f64,
    pub performance_score: f64,
    pub drift_score: f64,
    pub ai_score: f64,
    pub history_score: f64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_ordering_matches_rank() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn risk_level_buckets() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(24.9), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(49.9), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::Critical);
    }

    #[test]
    fn risk_level_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&RiskLevel::Critical).unwrap(),
            "\"CRITICAL\""
        );
        assert_eq!("medium".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
    }

    #[test]
    fn auth_config_round_trips_tagged() {
        let auth: AuthConfig = serde_json::from_value(serde_json::json!({
            "type": "api-key",
            "key": "X-Api-Key",
            "value": "secret",
        }))
        .unwrap();
        assert_eq!(
            auth,
            AuthConfig::ApiKey {
                key: "X-Api-Key".to_string(),
                value: "secret".to_string(),
                add_to: ApiKeyLocation::Header,
            }
        );
    }

    #[test]
    fn key_value_defaults_to_enabled() {
        let kv: KeyValue =
            serde_json::from_value(serde_json::json!({"key": "a", "value": "b"})).unwrap();
        assert!(kv.enabled);
        assert!(kv.is_active());

        let blank = KeyValue::new("   ", "b");
        assert!(!blank.is_active());
    }

    #[test]
    fn http_method_parses_case_insensitively() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::GET);
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert!(!HttpMethod::HEAD.allows_body());
        assert!(HttpMethod::POST.allows_body());
    }
}
