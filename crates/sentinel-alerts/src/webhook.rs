//! Outbound webhook client.
//!
//! One shared pooled client for alert delivery, separate from the
//! executor's client because alert traffic has its own pool sizes and
//! timeout. One POST per alert, any 2xx is success, no retries, and
//! `send` never fails.

use reqwest::{Client, ClientBuilder};
use sentinel_common::{Error, Result, WebhookConfig};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const MAX_KEEPALIVE_CONNECTIONS: usize = 5;
const KEEPALIVE_IDLE_SECONDS: u64 = 30;

/// Webhook sender with managed client lifecycle.
///
/// Unavailable (and silently skipped) when webhooks are disabled or no URL
/// is configured.
pub struct WebhookClient {
    config: WebhookConfig,
    client: RwLock<Option<Client>>,
}

impl WebhookClient {
    pub fn new(config: WebhookConfig) -> Self {
        WebhookClient {
            config,
            client: RwLock::new(None),
        }
    }

    /// Create the shared client. Idempotent; a no-op when not configured.
    pub async fn start(&self) -> Result<()> {
        if !self.config.available() {
            info!(
                "Webhook client disabled — enabled={}, url {}",
                self.config.enabled,
                if self.config.url.is_empty() { "empty" } else { "set" },
            );
            return Ok(());
        }

        let mut guard = self.client.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let client = ClientBuilder::new()
            .timeout(self.config.timeout())
            .pool_max_idle_per_host(MAX_KEEPALIVE_CONNECTIONS)
            .pool_idle_timeout(Duration::from_secs(KEEPALIVE_IDLE_SECONDS))
            .user_agent(concat!("sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create webhook client: {e}")))?;
        *guard = Some(client);

        info!(
            "Webhook client started (url={}, timeout={:.0}s)",
            self.config.url, self.config.timeout_seconds
        );
        Ok(())
    }

    pub async fn stop(&self) {
        let mut guard = self.client.write().await;
        if guard.take().is_some() {
            info!("Webhook client stopped");
        }
    }

    pub async fn is_available(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// POST a JSON payload to the configured webhook URL.
    ///
    /// Returns true on any 2xx, false on everything else including
    /// timeouts. Never fails, never retries.
    pub async fn send(&self, payload: &Value) -> bool {
        let client = match self.client.read().await.clone() {
            Some(client) => client,
            None => {
                debug!("Webhook send skipped — client not available");
                return false;
            }
        };

        match client.post(&self.config.url).json(payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Webhook delivered: {} {}", response.status(), self.config.url);
                true
            }
            Ok(response) => {
                warn!(
                    "Webhook rejected: {} {}",
                    response.status(),
                    self.config.url
                );
                false
            }
            Err(e) if e.is_timeout() => {
                warn!("Webhook timed out: {}", self.config.url);
                false
            }
            Err(e) => {
                warn!("Webhook send failed: {} — {}", self.config.url, e);
                false
            }
        }
    }
}
