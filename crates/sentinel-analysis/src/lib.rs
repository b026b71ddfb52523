//! Pure analysis engines for the Sentinel monitoring pipeline
//!
//! Three deterministic, I/O-free components: the structural JSON schema
//! diff, the rolling performance analyzer, and the weighted risk scorer.
//! Each is called by the pipeline orchestrator with pre-fetched data.

pub mod performance;
pub mod risk;
pub mod schema_diff;

pub use performance::{PerformanceSnapshot, PerformanceTracker};
pub use risk::{RiskEngine, RiskResult};
pub use schema_diff::{
    compute_diff, DiffKind, DriftAnalysis, SchemaDiffResult, SchemaDifference, SchemaValidator,
};
