//! Tenant-scoped relational persistence for the Sentinel monitoring pipeline
//!
//! Exposes the storage contract as two capability traits: a [`Store`] that
//! hands out sessions, and a [`StoreSession`] scoping exactly one pipeline
//! run. Sessions are never shared across tasks; every scheduler tick opens
//! its own from the factory and commits or rolls back atomically, so a run
//! and its owned rows become visible together or not at all.
//!
//! Two implementations: [`postgres::PgStore`] over sqlx, and
//! [`memory::MemoryStore`] for tests and local development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use sentinel_common::{AnomalyRecord, EndpointSpec, Result, RiskRecord, Run, TenantId};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Session factory. Implementations hold the shared connection pool.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a fresh session scoping one pipeline run
    async fn session(&self) -> Result<Box<dyn StoreSession>>;
}

/// One storage session, transactional over a single pipeline run.
///
/// Reads observe the session's own uncommitted writes, like a relational
/// transaction. Dropping a session without committing discards its writes.
#[async_trait]
pub trait StoreSession: Send {
    /// Fetch an endpoint. A tenant mismatch is indistinguishable from a
    /// missing endpoint: both return `Ok(None)`.
    async fn get_endpoint(
        &mut self,
        id: Uuid,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<EndpointSpec>>;

    /// All registered endpoints, newest first
    async fn list_endpoints(&mut self) -> Result<Vec<EndpointSpec>>;

    async fn insert_run(&mut self, run: &Run) -> Result<()>;

    /// Most recent non-null response times for an endpoint, newest first
    async fn recent_response_times(
        &mut self,
        endpoint_id: Uuid,
        limit: i64,
    ) -> Result<Vec<f64>>;

    /// Failure percentage over all recorded runs, rounded to 2 decimals;
    /// 0.0 when the endpoint has no runs
    async fn failure_rate(
        &mut self,
        endpoint_id: Uuid,
        tenant_id: Option<TenantId>,
    ) -> Result<f64>;

    async fn insert_anomaly(&mut self, anomaly: &AnomalyRecord) -> Result<()>;

    async fn insert_risk(&mut self, risk: &RiskRecord) -> Result<()>;

    /// Make every write of this session visible atomically
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write of this session
    async fn rollback(self: Box<Self>) -> Result<()>;
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
