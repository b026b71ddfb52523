//! Common types and utilities for the Sentinel monitoring pipeline
//!
//! This crate provides the shared domain model, error type, and
//! environment-sourced configuration used across all pipeline components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AiConfig, Config, DatabaseConfig, SchedulerConfig, WebhookConfig};
pub use error::{Error, Result};
pub use types::*;
