//! Cost-gated anomaly classification for the Sentinel monitoring pipeline
//!
//! Provides the bounded model gateway and the anomaly classifier that
//! fronts it: the classifier opens the gateway only when a run raises a
//! signal, and falls back to deterministic rule-based scoring whenever the
//! model is unavailable or unusable.

pub mod classifier;
pub mod gateway;
pub mod prompts;

pub use classifier::{AnomalyClassifier, ClassifyContext};
pub use gateway::{GatewaySnapshot, LlmGateway, MAX_RETRIES};
pub use prompts::{build_user_prompt, PromptContext, SYSTEM_PROMPT};
