//! Pooled HTTP execution engine.
//!
//! Executes a single monitored request with per-attempt timing, bounded
//! body capture, and linear-backoff retries for transport failures. Any
//! observed HTTP response, including 5xx, ends the attempt loop; retries
//! apply only when no status was seen. `execute` never fails: network
//! errors, timeouts, and unexpected statuses all land in the returned
//! [`RunOutcome`].

use crate::request::{PlannedBody, RequestPlan};
use reqwest::{Client, ClientBuilder};
use sentinel_common::{Error, HttpMethod, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cap on stored response bodies
pub const MAX_RESPONSE_BODY_BYTES: usize = 512 * 1024;

/// Process-wide bound on concurrent in-flight requests
const MAX_CONCURRENT_REQUESTS: usize = 100;
const MAX_KEEPALIVE_CONNECTIONS: usize = 20;
const KEEPALIVE_IDLE_SECONDS: u64 = 30;

/// Per-request knobs; callers can override the defaults
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub timeout: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Linear backoff base: sleep `backoff_base * attempt_index` between attempts
    pub backoff_base: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            timeout: Duration::from_secs(30),
            max_attempts: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Immutable result of one endpoint execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
    /// Captured JSON body; non-object payloads arrive wrapped as `{"_value": …}`
    pub response_body: Option<Value>,
    pub is_success: bool,
    pub error_message: Option<String>,
}

impl RunOutcome {
    fn transport_error(message: String) -> Self {
        RunOutcome {
            error_message: Some(message),
            ..RunOutcome::default()
        }
    }
}

/// Process-wide HTTP executor holding one pooled, keep-alive client.
///
/// Lifecycle: one-shot [`start`](HttpExecutor::start) before any job is
/// scheduled, one-shot [`stop`](HttpExecutor::stop) after the scheduler.
pub struct HttpExecutor {
    client: RwLock<Option<Client>>,
    limit: Arc<Semaphore>,
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpExecutor {
    pub fn new() -> Self {
        HttpExecutor {
            client: RwLock::new(None),
            limit: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        }
    }

    /// Create the shared HTTP client. Idempotent.
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.client.write().await;
        if guard.is_some() {
            warn!("HTTP executor already started — skipping");
            return Ok(());
        }

        let client = ClientBuilder::new()
            .pool_max_idle_per_host(MAX_KEEPALIVE_CONNECTIONS)
            .pool_idle_timeout(Duration::from_secs(KEEPALIVE_IDLE_SECONDS))
            .user_agent(concat!("sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;

        *guard = Some(client);
        info!("HTTP executor started");
        Ok(())
    }

    /// Drop the shared HTTP client, closing pooled connections
    pub async fn stop(&self) {
        let mut guard = self.client.write().await;
        if guard.take().is_some() {
            info!("HTTP executor stopped");
        }
    }

    /// Execute an HTTP request with retries and return a [`RunOutcome`].
    ///
    /// This method never fails; all failure modes are captured in the result.
    pub async fn execute(
        &self,
        url: &str,
        method: HttpMethod,
        expected_status: u16,
        plan: &RequestPlan,
        config: &ExecutorConfig,
    ) -> RunOutcome {
        let mut last = RunOutcome::transport_error("no attempt executed".to_string());

        for attempt in 1..=config.max_attempts.max(1) {
            last = self.single_attempt(url, method, expected_status, plan, config).await;

            // Success or any observed HTTP response ends the loop; retries
            // apply only to transport failures.
            if last.is_success || last.status_code.is_some() {
                return last;
            }

            warn!(
                "Attempt {}/{} failed for {} {}: {}",
                attempt,
                config.max_attempts,
                method,
                url,
                last.error_message.as_deref().unwrap_or("unknown error"),
            );
            if attempt < config.max_attempts {
                tokio::time::sleep(config.backoff_base * attempt).await;
            }
        }

        last
    }

    async fn single_attempt(
        &self,
        url: &str,
        method: HttpMethod,
        expected_status: u16,
        plan: &RequestPlan,
        config: &ExecutorConfig,
    ) -> RunOutcome {
        let client = match self.client.read().await.clone() {
            Some(client) => client,
            None => {
                return RunOutcome::transport_error(
                    "HTTP executor not started — call start() first".to_string(),
                )
            }
        };

        let _permit = match self.limit.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return RunOutcome::transport_error("request limiter closed".to_string())
            }
        };

        let mut request = client
            .request(to_reqwest_method(method), url)
            .timeout(config.timeout);

        if !plan.query.is_empty() {
            request = request.query(&plan.query);
        }

        let mut has_content_type = false;
        for (key, value) in &plan.headers {
            if key.eq_ignore_ascii_case("content-type") {
                has_content_type = true;
            }
            request = request.header(key, value);
        }

        if let Some(body) = &plan.body {
            request = match body {
                PlannedBody::Raw {
                    content,
                    content_type,
                } => {
                    let request = if has_content_type {
                        request
                    } else {
                        request.header("Content-Type", *content_type)
                    };
                    request.body(content.clone())
                }
                PlannedBody::Form(pairs) => request.form(pairs),
                PlannedBody::Multipart(pairs) => {
                    let mut form = reqwest::multipart::Form::new();
                    for (key, value) in pairs {
                        form = form.text(key.clone(), value.clone());
                    }
                    request.multipart(form)
                }
            };
        }

        let start = Instant::now();
        match request.send().await {
            Ok(response) => {
                let elapsed_ms = round2(start.elapsed().as_secs_f64() * 1000.0);
                let status = response.status().as_u16();
                let is_success = status == expected_status;

                if !is_success {
                    info!(
                        "{} {} returned {} (expected {}) in {:.1} ms",
                        method, url, status, expected_status, elapsed_ms
                    );
                }

                RunOutcome {
                    status_code: Some(status),
                    response_time_ms: Some(elapsed_ms),
                    response_body: capture_json(response).await,
                    is_success,
                    error_message: None,
                }
            }
            Err(e) if e.is_timeout() => {
                let elapsed_ms = round2(start.elapsed().as_secs_f64() * 1000.0);
                RunOutcome {
                    response_time_ms: Some(elapsed_ms),
                    error_message: Some(format!(
                        "Timeout after {:.0}s: {e}",
                        config.timeout.as_secs_f64()
                    )),
                    ..RunOutcome::default()
                }
            }
            Err(e) if e.is_connect() => {
                RunOutcome::transport_error(format!("Connection error: {e}"))
            }
            Err(e) => RunOutcome::transport_error(format!("HTTP error: {e}")),
        }
    }
}

/// Attempt to capture the response body as JSON.
///
/// Returns `None` when the content type is not JSON, the body exceeds the
/// size cap, or decoding fails. Decoded non-object values are wrapped as
/// `{"_value": …}` so stored bodies are always objects.
async fn capture_json(response: reqwest::Response) -> Option<Value> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("json") {
        return None;
    }

    let bytes = response.bytes().await.ok()?;
    if bytes.len() > MAX_RESPONSE_BODY_BYTES {
        warn!(
            "Response body too large ({} bytes), skipping JSON capture",
            bytes.len()
        );
        return None;
    }

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) if value.is_object() => Some(value),
        Ok(value) => Some(serde_json::json!({ "_value": value })),
        Err(e) => {
            debug!("Response body is not valid JSON: {e}");
            None
        }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::GET => reqwest::Method::GET,
        HttpMethod::POST => reqwest::Method::POST,
        HttpMethod::PUT => reqwest::Method::PUT,
        HttpMethod::PATCH => reqwest::Method::PATCH,
        HttpMethod::DELETE => reqwest::Method::DELETE,
        HttpMethod::HEAD => reqwest::Method::HEAD,
        HttpMethod::OPTIONS => reqwest::Method::OPTIONS,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::build_request_plan;
    use chrono::Utc;
    use sentinel_common::{AuthConfig, BodyConfig, EndpointSpec, KeyValue};
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn started_executor() -> HttpExecutor {
        let executor = HttpExecutor::new();
        executor.start().await.unwrap();
        executor
    }

    fn quick_config() -> ExecutorConfig {
        ExecutorConfig {
            timeout: Duration::from_secs(2),
            max_attempts: 2,
            backoff_base: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn captures_json_object_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let executor = started_executor().await;
        let outcome = executor
            .execute(
                &format!("{}/ok", server.uri()),
                HttpMethod::GET,
                200,
                &RequestPlan::default(),
                &quick_config(),
            )
            .await;

        assert_eq!(outcome.status_code, Some(200));
        assert!(outcome.is_success);
        assert!(outcome.error_message.is_none());
        assert_eq!(outcome.response_body, Some(json!({"ok": true})));
        assert!(outcome.response_time_ms.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn wraps_non_object_json_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
            .mount(&server)
            .await;

        let executor = started_executor().await;
        let outcome = executor
            .execute(
                &server.uri(),
                HttpMethod::GET,
                200,
                &RequestPlan::default(),
                &quick_config(),
            )
            .await;

        assert_eq!(outcome.response_body, Some(json!({"_value": [1, 2, 3]})));
    }

    #[tokio::test]
    async fn non_json_content_type_is_not_captured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let executor = started_executor().await;
        let outcome = executor
            .execute(
                &server.uri(),
                HttpMethod::GET,
                200,
                &RequestPlan::default(),
                &quick_config(),
            )
            .await;

        assert!(outcome.is_success);
        assert!(outcome.response_body.is_none());
    }

    #[tokio::test]
    async fn oversize_body_is_dropped_but_exact_cap_is_kept() {
        let server = MockServer::start().await;
        // A JSON string body of exactly 512 KiB: quotes + 524286 chars
        let exact = format!("\"{}\"", "x".repeat(MAX_RESPONSE_BODY_BYTES - 2));
        Mock::given(method("GET"))
            .and(path("/exact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/json")
                    .set_body_string(exact),
            )
            .mount(&server)
            .await;
        let oversize = format!("\"{}\"", "x".repeat(MAX_RESPONSE_BODY_BYTES));
        Mock::given(method("GET"))
            .and(path("/oversize"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/json")
                    .set_body_string(oversize),
            )
            .mount(&server)
            .await;

        let executor = started_executor().await;
        let kept = executor
            .execute(
                &format!("{}/exact", server.uri()),
                HttpMethod::GET,
                200,
                &RequestPlan::default(),
                &quick_config(),
            )
            .await;
        assert!(kept.response_body.is_some());

        let dropped = executor
            .execute(
                &format!("{}/oversize", server.uri()),
                HttpMethod::GET,
                200,
                &RequestPlan::default(),
                &quick_config(),
            )
            .await;
        assert!(dropped.response_body.is_none());
    }

    #[tokio::test]
    async fn server_error_returns_immediately_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let executor = started_executor().await;
        let outcome = executor
            .execute(
                &server.uri(),
                HttpMethod::GET,
                200,
                &RequestPlan::default(),
                &quick_config(),
            )
            .await;

        assert_eq!(outcome.status_code, Some(503));
        assert!(!outcome.is_success);
        assert!(outcome.error_message.is_none());
    }

    #[tokio::test]
    async fn timeout_is_retried_and_second_attempt_counts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true}))
                    .set_delay(Duration::from_secs(5)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let executor = started_executor().await;
        let outcome = executor
            .execute(
                &server.uri(),
                HttpMethod::GET,
                200,
                &RequestPlan::default(),
                &ExecutorConfig {
                    timeout: Duration::from_millis(200),
                    max_attempts: 2,
                    backoff_base: Duration::from_millis(10),
                },
            )
            .await;

        assert_eq!(outcome.status_code, Some(200));
        assert!(outcome.is_success);
        assert!(outcome.error_message.is_none());
    }

    #[tokio::test]
    async fn transport_failure_surfaces_error_without_status() {
        let executor = started_executor().await;
        // Unroutable per RFC 5737; connection must fail
        let outcome = executor
            .execute(
                "http://192.0.2.1:81/",
                HttpMethod::GET,
                200,
                &RequestPlan::default(),
                &ExecutorConfig {
                    timeout: Duration::from_millis(250),
                    max_attempts: 2,
                    backoff_base: Duration::from_millis(10),
                },
            )
            .await;

        assert!(outcome.status_code.is_none());
        assert!(!outcome.is_success);
        assert!(outcome.error_message.is_some());
    }

    #[tokio::test]
    async fn unstarted_executor_reports_an_error_outcome() {
        let executor = HttpExecutor::new();
        let outcome = executor
            .execute(
                "http://localhost/",
                HttpMethod::GET,
                200,
                &RequestPlan::default(),
                &quick_config(),
            )
            .await;
        assert!(outcome.error_message.unwrap().contains("not started"));
    }

    #[tokio::test]
    async fn applies_request_plan_headers_query_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("Authorization", "Bearer tok"))
            .and(header("Cookie", "session=abc"))
            .and(header("Content-Type", "application/json"))
            .and(query_param("verbose", "1"))
            .and(body_string("{\"a\":1}"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let spec = EndpointSpec {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "submit".to_string(),
            url: format!("{}/submit", server.uri()),
            method: HttpMethod::POST,
            expected_status: 201,
            expected_schema: None,
            query_params: Some(vec![KeyValue::new("verbose", "1")]),
            request_headers: None,
            cookies: Some(vec![KeyValue::new("session", "abc")]),
            auth: Some(AuthConfig::Bearer {
                token: "tok".to_string(),
            }),
            body: Some(BodyConfig::Json {
                raw: "{\"a\":1}".to_string(),
            }),
            interval_seconds: 60,
            created_at: Utc::now(),
        };

        let executor = started_executor().await;
        let outcome = executor
            .execute(
                &spec.url,
                spec.method,
                spec.expected_status,
                &build_request_plan(&spec),
                &quick_config(),
            )
            .await;

        assert!(outcome.is_success);
    }
}
