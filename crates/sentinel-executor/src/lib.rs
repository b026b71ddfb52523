//! Bounded HTTP execution engine for Sentinel endpoint monitoring
//!
//! Holds the process-wide pooled HTTP client, builds the effective request
//! from an endpoint's configuration, and executes timed, retrying attempts
//! that never propagate errors.

pub mod executor;
pub mod request;

pub use executor::{ExecutorConfig, HttpExecutor, RunOutcome, MAX_RESPONSE_BODY_BYTES};
pub use request::{build_request_plan, PlannedBody, RequestPlan};
