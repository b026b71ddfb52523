//! Bounded gateway to an external JSON-mode chat model.
//!
//! Wraps an OpenAI-compatible chat completion API behind a pooled client
//! with a fixed attempt limit, exponential backoff on transient failures,
//! and thread-safe call metrics. `analyse` never fails: every failure mode
//! collapses to `None`, leaving classification to the rule-based fallback.

use parking_lot::Mutex;
use reqwest::{Client, ClientBuilder, StatusCode};
use sentinel_common::{AiConfig, Error, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Maximum retries beyond the first attempt, one per backoff step
pub const MAX_RETRIES: u32 = 3;

/// Total attempts per call: the first plus one per retry
const MAX_ATTEMPTS: u32 = MAX_RETRIES + 1;

/// Model sampling temperature, fixed for reproducible analyses
const TEMPERATURE: f64 = 0.2;

/// HTTP statuses worth retrying: gateway hiccups and rate limits
const TRANSIENT_STATUS: [u16; 5] = [429, 502, 503, 504, 529];

#[derive(Debug, Default, Clone)]
struct GatewayMetrics {
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    retried_calls: u64,
    total_tokens: u64,
    total_latency_ms: f64,
    last_error: Option<String>,
}

/// Point-in-time view of gateway metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct GatewaySnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub retried_calls: u64,
    pub total_tokens: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub last_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

/// Process-wide model gateway with managed client lifecycle.
///
/// Created once at startup; unavailable (and silently skipped) when no API
/// key is configured.
pub struct LlmGateway {
    config: AiConfig,
    client: RwLock<Option<Client>>,
    metrics: Mutex<GatewayMetrics>,
}

impl LlmGateway {
    pub fn new(config: AiConfig) -> Self {
        LlmGateway {
            config,
            client: RwLock::new(None),
            metrics: Mutex::new(GatewayMetrics::default()),
        }
    }

    /// Create the pooled client. Idempotent; a no-op without an API key.
    pub async fn start(&self) -> Result<()> {
        if !self.config.available() {
            warn!("Model gateway disabled — no API key configured");
            return Ok(());
        }

        let mut guard = self.client.write().await;
        if guard.is_some() {
            warn!("Model gateway already started — skipping");
            return Ok(());
        }

        let client = ClientBuilder::new()
            .timeout(self.config.timeout())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create model client: {e}")))?;
        *guard = Some(client);

        info!(
            "Model gateway started (model={}, timeout={:.0}s)",
            self.config.model, self.config.timeout_seconds
        );
        Ok(())
    }

    /// Drop the client, closing pooled connections
    pub async fn stop(&self) {
        let mut guard = self.client.write().await;
        if guard.take().is_some() {
            info!("Model gateway stopped");
        }
    }

    pub async fn is_available(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// Send a prompt pair and return the parsed JSON object response.
    ///
    /// Returns `None` when the client is not started, when every transient
    /// retry is exhausted, when a terminal HTTP status is observed, or when
    /// the model returns anything but a JSON object. Never fails.
    pub async fn analyse(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Option<Map<String, Value>> {
        let client = match self.client.read().await.clone() {
            Some(client) => client,
            None => {
                debug!("Model call skipped — gateway not available");
                return None;
            }
        };

        self.metrics.lock().total_calls += 1;

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": TEMPERATURE,
            "response_format": {"type": "json_object"},
        });
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                // Exponential backoff: 1 s, 2 s, 4 s
                let delay = Duration::from_secs(1 << (attempt - 2));
                debug!("Retrying model call in {:?} (attempt {attempt}/{MAX_ATTEMPTS})", delay);
                tokio::time::sleep(delay).await;
                self.metrics.lock().retried_calls += 1;
            }

            let start = Instant::now();
            let response = client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                    return self.parse_success(response, elapsed_ms).await;
                }
                Ok(response) => {
                    let status = response.status();
                    if is_transient_status(status) && attempt < MAX_ATTEMPTS {
                        warn!("Model call returned {status}, will retry");
                        self.record_failure(format!("HTTP {status}"), false);
                        continue;
                    }
                    warn!("Model call failed with terminal status {status}");
                    self.record_failure(format!("HTTP {status}"), true);
                    return None;
                }
                Err(e) => {
                    if is_transient_error(&e) && attempt < MAX_ATTEMPTS {
                        warn!("Model call failed: {e}, will retry");
                        self.record_failure(e.to_string(), false);
                        continue;
                    }
                    warn!("Model call failed: {e}");
                    self.record_failure(e.to_string(), true);
                    return None;
                }
            }
        }

        None
    }

    async fn parse_success(
        &self,
        response: reqwest::Response,
        elapsed_ms: f64,
    ) -> Option<Map<String, Value>> {
        let chat: ChatResponse = match response.json().await {
            Ok(chat) => chat,
            Err(e) => {
                self.record_failure(format!("unreadable completion payload: {e}"), true);
                return None;
            }
        };

        let tokens = chat.usage.map(|u| u.total_tokens).unwrap_or(0);
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.is_empty() {
            self.record_failure("model returned empty content".to_string(), true);
            return None;
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => {
                let mut metrics = self.metrics.lock();
                metrics.successful_calls += 1;
                metrics.total_tokens += tokens;
                metrics.total_latency_ms += elapsed_ms;
                drop(metrics);
                debug!("Model response received ({tokens} tokens)");
                Some(map)
            }
            Ok(other) => {
                self.record_failure(
                    format!("model returned non-object JSON: {}", type_name(&other)),
                    true,
                );
                None
            }
            Err(e) => {
                self.record_failure(format!("model returned invalid JSON: {e}"), true);
                None
            }
        }
    }

    fn record_failure(&self, error: String, terminal: bool) {
        let mut metrics = self.metrics.lock();
        if terminal {
            metrics.failed_calls += 1;
        }
        metrics.last_error = Some(error);
    }

    /// Thread-safe view of the call metrics
    pub fn snapshot(&self) -> GatewaySnapshot {
        let metrics = self.metrics.lock();
        let success_rate = if metrics.total_calls > 0 {
            metrics.successful_calls as f64 / metrics.total_calls as f64
        } else {
            0.0
        };
        let avg_latency_ms = if metrics.successful_calls > 0 {
            metrics.total_latency_ms / metrics.successful_calls as f64
        } else {
            0.0
        };
        GatewaySnapshot {
            total_calls: metrics.total_calls,
            successful_calls: metrics.successful_calls,
            failed_calls: metrics.failed_calls,
            retried_calls: metrics.retried_calls,
            total_tokens: metrics.total_tokens,
            success_rate,
            avg_latency_ms,
            last_error: metrics.last_error.clone(),
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    TRANSIENT_STATUS.contains(&status.as_u16())
}

fn is_transient_error(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() {
        return true;
    }
    // Mid-transfer resets surface as request/body failures without a status
    e.status().is_none() && (e.is_request() || e.is_body())
}

fn type_name(value: &Value) -> &'static str {
    sentinel_analysis::schema_diff::type_label(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str, timeout: f64) -> AiConfig {
        AiConfig {
            enabled: true,
            api_key: "test-key".to_string(),
            api_base: base.to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: timeout,
        }
    }

    fn completion(content: &str, tokens: u64) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"total_tokens": tokens},
        })
    }

    #[tokio::test]
    async fn parses_json_object_responses_and_counts_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "temperature": 0.2,
                "response_format": {"type": "json_object"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "{\"anomaly_detected\": true, \"severity_score\": 70}",
                123,
            )))
            .mount(&server)
            .await;

        let gateway = LlmGateway::new(config(&server.uri(), 5.0));
        gateway.start().await.unwrap();

        let result = gateway.analyse("system", "user").await.unwrap();
        assert_eq!(result["anomaly_detected"], json!(true));

        let snapshot = gateway.snapshot();
        assert_eq!(snapshot.total_calls, 1);
        assert_eq!(snapshot.successful_calls, 1);
        assert_eq!(snapshot.total_tokens, 123);
        assert_eq!(snapshot.success_rate, 1.0);
    }

    #[tokio::test]
    async fn gateway_without_key_is_unavailable() {
        let gateway = LlmGateway::new(AiConfig {
            enabled: true,
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 5.0,
        });
        gateway.start().await.unwrap();
        assert!(!gateway.is_available().await);
        assert!(gateway.analyse("s", "u").await.is_none());
        assert_eq!(gateway.snapshot().total_calls, 0);
    }

    #[tokio::test]
    async fn transient_status_is_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("{\"ok\": true}", 5)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gateway = LlmGateway::new(config(&server.uri(), 5.0));
        gateway.start().await.unwrap();

        let result = gateway.analyse("system", "user").await;
        assert!(result.is_some());

        let snapshot = gateway.snapshot();
        assert_eq!(snapshot.retried_calls, 1);
        assert_eq!(snapshot.successful_calls, 1);
    }

    #[tokio::test]
    async fn terminal_status_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = LlmGateway::new(config(&server.uri(), 5.0));
        gateway.start().await.unwrap();

        assert!(gateway.analyse("system", "user").await.is_none());
        let snapshot = gateway.snapshot();
        assert_eq!(snapshot.failed_calls, 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("HTTP 400 Bad Request"));
    }

    #[tokio::test]
    async fn non_object_content_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("[1, 2, 3]", 5)),
            )
            .mount(&server)
            .await;

        let gateway = LlmGateway::new(config(&server.uri(), 5.0));
        gateway.start().await.unwrap();

        assert!(gateway.analyse("system", "user").await.is_none());
        assert!(gateway
            .snapshot()
            .last_error
            .unwrap()
            .contains("non-object"));
    }
}
