//! In-memory store for tests and local development.
//!
//! Mirrors the relational semantics the pipeline relies on: sessions
//! buffer their writes and see them (read-your-writes), and nothing
//! becomes visible to other sessions until `commit`. Dropping a session
//! or calling `rollback` discards the buffered rows.

use crate::{round2, Store, StoreSession};
use async_trait::async_trait;
use parking_lot::Mutex;
use sentinel_common::{
    AnomalyRecord, EndpointSpec, Result, RiskRecord, Run, TenantId,
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    endpoints: Vec<EndpointSpec>,
    runs: Vec<Run>,
    anomalies: Vec<AnomalyRecord>,
    risks: Vec<RiskRecord>,
}

/// Shared in-memory store
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint (test/setup helper, outside any session)
    pub fn add_endpoint(&self, endpoint: EndpointSpec) {
        self.state.lock().endpoints.push(endpoint);
    }

    pub fn remove_endpoint(&self, id: Uuid) {
        self.state.lock().endpoints.retain(|e| e.id != id);
    }

    pub fn set_interval(&self, id: Uuid, interval_seconds: u32) {
        let mut state = self.state.lock();
        if let Some(endpoint) = state.endpoints.iter_mut().find(|e| e.id == id) {
            endpoint.interval_seconds = interval_seconds;
        }
    }

    /// Committed runs for an endpoint, insertion order
    pub fn runs_for(&self, endpoint_id: Uuid) -> Vec<Run> {
        self.state
            .lock()
            .runs
            .iter()
            .filter(|r| r.endpoint_id == endpoint_id)
            .cloned()
            .collect()
    }

    pub fn anomalies(&self) -> Vec<AnomalyRecord> {
        self.state.lock().anomalies.clone()
    }

    pub fn risks(&self) -> Vec<RiskRecord> {
        self.state.lock().risks.clone()
    }

    pub fn risk_for_run(&self, run_id: Uuid) -> Option<RiskRecord> {
        self.state
            .lock()
            .risks
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn session(&self) -> Result<Box<dyn StoreSession>> {
        Ok(Box::new(MemorySession {
            state: self.state.clone(),
            pending_runs: Vec::new(),
            pending_anomalies: Vec::new(),
            pending_risks: Vec::new(),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    pending_runs: Vec<Run>,
    pending_anomalies: Vec<AnomalyRecord>,
    pending_risks: Vec<RiskRecord>,
}

impl MemorySession {
    /// Committed + this session's pending runs for an endpoint
    fn visible_runs(&self, endpoint_id: Uuid, tenant_id: Option<TenantId>) -> Vec<Run> {
        let state = self.state.lock();
        state
            .runs
            .iter()
            .chain(self.pending_runs.iter())
            .filter(|r| r.endpoint_id == endpoint_id)
            .filter(|r| tenant_id.map(|t| r.tenant_id == t).unwrap_or(true))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn get_endpoint(
        &mut self,
        id: Uuid,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<EndpointSpec>> {
        let state = self.state.lock();
        let endpoint = state.endpoints.iter().find(|e| e.id == id).cloned();
        Ok(endpoint.filter(|e| tenant_id.map(|t| e.tenant_id == t).unwrap_or(true)))
    }

    async fn list_endpoints(&mut self) -> Result<Vec<EndpointSpec>> {
        let state = self.state.lock();
        let mut endpoints = state.endpoints.clone();
        endpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(endpoints)
    }

    async fn insert_run(&mut self, run: &Run) -> Result<()> {
        self.pending_runs.push(run.clone());
        Ok(())
    }

    async fn recent_response_times(
        &mut self,
        endpoint_id: Uuid,
        limit: i64,
    ) -> Result<Vec<f64>> {
        let mut runs = self.visible_runs(endpoint_id, None);
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs
            .iter()
            .filter_map(|r| r.response_time_ms)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn failure_rate(
        &mut self,
        endpoint_id: Uuid,
        tenant_id: Option<TenantId>,
    ) -> Result<f64> {
        let runs = self.visible_runs(endpoint_id, tenant_id);
        if runs.is_empty() {
            return Ok(0.0);
        }
        let failures = runs.iter().filter(|r| !r.is_success).count();
        Ok(round2(failures as f64 / runs.len() as f64 * 100.0))
    }

    async fn insert_anomaly(&mut self, anomaly: &AnomalyRecord) -> Result<()> {
        self.pending_anomalies.push(anomaly.clone());
        Ok(())
    }

    async fn insert_risk(&mut self, risk: &RiskRecord) -> Result<()> {
        self.pending_risks.push(risk.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock();
        state.runs.extend(self.pending_runs);
        state.anomalies.extend(self.pending_anomalies);
        state.risks.extend(self.pending_risks);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
