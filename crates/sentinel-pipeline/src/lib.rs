//! Pipeline orchestrator for the Sentinel monitoring pipeline
//!
//! Assembles the executor, analysis engines, classifier, and storage
//! around a single endpoint execution and persists its artifacts
//! atomically.

pub mod runner;

pub use runner::{PipelineResult, PipelineRunner};
