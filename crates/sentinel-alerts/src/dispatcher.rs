//! Alert dispatch decision.
//!
//! Single entry point the scheduler calls after a pipeline run commits:
//! gate on the configured minimum risk level, build the payload, send it.
//! Never fails; the outcome summary says what happened.

use crate::payload::build_alert_payload;
use crate::webhook::WebhookClient;
use sentinel_common::RiskLevel;
use sentinel_pipeline::PipelineResult;
use tracing::{debug, info};

/// Summary of one dispatch decision
#[derive(Debug, Clone, PartialEq)]
pub struct AlertOutcome {
    /// A webhook POST was attempted
    pub alerted: bool,
    /// The POST got a 2xx back
    pub delivered: bool,
    /// Why no POST was attempted (gate skips)
    pub skip_reason: Option<&'static str>,
    pub risk_level: RiskLevel,
}

impl AlertOutcome {
    fn skipped(reason: &'static str, risk_level: RiskLevel) -> Self {
        AlertOutcome {
            alerted: false,
            delivered: false,
            skip_reason: Some(reason),
            risk_level,
        }
    }
}

/// Threshold-gated webhook dispatcher
pub struct AlertDispatcher {
    webhook: WebhookClient,
    min_risk_level: RiskLevel,
}

impl AlertDispatcher {
    pub fn new(webhook: WebhookClient, min_risk_level: RiskLevel) -> Self {
        AlertDispatcher {
            webhook,
            min_risk_level,
        }
    }

    pub fn webhook(&self) -> &WebhookClient {
        &self.webhook
    }

    /// Check the threshold and dispatch the webhook if warranted.
    /// Never fails.
    pub async fn maybe_alert(&self, pipeline: &PipelineResult) -> AlertOutcome {
        let risk_level = pipeline.risk.risk_level;

        if !self.webhook.is_available().await {
            return AlertOutcome::skipped("webhook_unavailable", risk_level);
        }

        if risk_level < self.min_risk_level {
            debug!(
                "Alert skipped for {}: risk={} < threshold={}",
                pipeline.endpoint_name, risk_level, self.min_risk_level
            );
            return AlertOutcome::skipped("below_threshold", risk_level);
        }

        info!(
            "Dispatching alert for {}: risk={}({:.1})",
            pipeline.endpoint_name, risk_level, pipeline.risk.calculated_score
        );

        let payload = build_alert_payload(pipeline);
        let delivered = self.webhook.send(&payload).await;

        AlertOutcome {
            alerted: true,
            delivered,
            skip_reason: None,
            risk_level,
        }
    }
}
