//! Threshold-gated webhook alerting for the Sentinel monitoring pipeline
//!
//! After a pipeline run commits, the dispatcher compares its risk level
//! against the configured minimum and, when warranted, POSTs a
//! self-contained alert payload to the configured webhook. Delivery is
//! best-effort: one attempt, no retries, failures only logged.

pub mod dispatcher;
pub mod payload;
pub mod webhook;

pub use dispatcher::{AlertDispatcher, AlertOutcome};
pub use payload::build_alert_payload;
pub use webhook::WebhookClient;
