//! Pipeline orchestration for a single endpoint execution.
//!
//! Coordinates: load endpoint → execute HTTP → persist run → performance
//! analysis → schema drift → anomaly classification → risk scoring →
//! atomic commit. The only surfaced failures are an unknown endpoint
//! (`NotFound`) and storage errors, which roll the session back; every
//! other condition lands inside the returned [`PipelineResult`].

use chrono::Utc;
use sentinel_ai::{AnomalyClassifier, ClassifyContext};
use sentinel_analysis::{
    DriftAnalysis, PerformanceSnapshot, PerformanceTracker, RiskEngine, RiskResult,
    SchemaValidator,
};
use sentinel_common::{
    AnomalyAssessment, AnomalyRecord, EndpointId, Error, HttpMethod, Result, RiskRecord, Run,
    TenantId,
};
use sentinel_executor::{build_request_plan, ExecutorConfig, HttpExecutor};
use sentinel_store::{Store, StoreSession};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// History window consulted for rolling performance stats
const HISTORY_LIMIT: i64 = 20;

/// Immutable output of the full monitoring pipeline for one run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run: Run,
    pub performance: Option<PerformanceSnapshot>,
    pub schema_drift: DriftAnalysis,
    pub anomaly: Option<AnomalyAssessment>,
    pub risk: RiskResult,
    // Endpoint metadata carried along so alerting needs no extra lookups
    pub endpoint_name: String,
    pub endpoint_url: String,
    pub endpoint_method: HttpMethod,
}

/// Coordinates one endpoint execution end to end.
///
/// Dependencies are injected so the runner is testable with in-memory
/// doubles; the analysis engines are stateless and owned directly.
pub struct PipelineRunner {
    store: Arc<dyn Store>,
    executor: Arc<HttpExecutor>,
    classifier: AnomalyClassifier,
    tracker: PerformanceTracker,
    validator: SchemaValidator,
    risk_engine: RiskEngine,
    executor_config: ExecutorConfig,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<HttpExecutor>,
        classifier: AnomalyClassifier,
    ) -> Self {
        PipelineRunner {
            store,
            executor,
            classifier,
            tracker: PerformanceTracker::default(),
            validator: SchemaValidator,
            risk_engine: RiskEngine,
            executor_config: ExecutorConfig::default(),
        }
    }

    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Run the full pipeline for one endpoint and return its result.
    ///
    /// All rows written for this run become visible atomically on commit;
    /// any storage failure rolls the whole session back.
    pub async fn execute_endpoint(
        &self,
        endpoint_id: EndpointId,
        tenant_id: Option<TenantId>,
    ) -> Result<PipelineResult> {
        let mut session = self.store.session().await?;

        match self
            .run_pipeline(session.as_mut(), endpoint_id, tenant_id)
            .await
        {
            Ok(result) => {
                session.commit().await?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rb) = session.rollback().await {
                    warn!("Session rollback failed after pipeline error: {rb}");
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        session: &mut dyn StoreSession,
        endpoint_id: EndpointId,
        tenant_id: Option<TenantId>,
    ) -> Result<PipelineResult> {
        // 1. Load the endpoint; tenant mismatches are indistinguishable
        //    from absence.
        let endpoint = session
            .get_endpoint(endpoint_id, tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("endpoint {endpoint_id} not found")))?;

        info!(
            "Executing {} {} (expected {})",
            endpoint.method, endpoint.url, endpoint.expected_status
        );

        // 2–3. Build the effective request and execute it
        let plan = build_request_plan(&endpoint);
        let started_at = Utc::now();
        let outcome = self
            .executor
            .execute(
                &endpoint.url,
                endpoint.method,
                endpoint.expected_status,
                &plan,
                &self.executor_config,
            )
            .await;

        // 4. Persist the run record
        let run = Run {
            id: Uuid::new_v4(),
            endpoint_id: endpoint.id,
            tenant_id: endpoint.tenant_id,
            started_at,
            status_code: outcome.status_code,
            response_time_ms: outcome.response_time_ms,
            response_body: outcome.response_body.clone(),
            is_success: outcome.is_success,
            error_message: outcome.error_message.clone(),
        };
        session.insert_run(&run).await?;

        info!(
            "Run {} for endpoint {}: success={} status={:?} time={:.1}ms",
            run.id,
            endpoint.name,
            run.is_success,
            run.status_code,
            run.response_time_ms.unwrap_or(0.0),
        );

        // 5. Performance analysis against prior response times
        let performance = match run.response_time_ms {
            Some(current_ms) => {
                let mut historical = session
                    .recent_response_times(endpoint.id, HISTORY_LIMIT)
                    .await?;
                // The window may include the run just stored; the times
                // cannot be excluded by id, so drop the first element when
                // it matches the just-recorded value.
                if historical.first() == Some(&current_ms) {
                    historical.remove(0);
                }
                Some(self.tracker.analyze(current_ms, &historical))
            }
            None => None,
        };

        // 6. Schema drift detection
        let schema_drift = self.validator.validate(
            endpoint.expected_schema.as_ref(),
            run.response_body.as_ref(),
        );

        // 7. Rolling failure rate, shared by classifier and risk scorer
        let failure_rate = session.failure_rate(endpoint.id, None).await?;

        // 8. Anomaly classification (cost-gated)
        let anomaly = self
            .classifier
            .classify(&ClassifyContext {
                endpoint_name: &endpoint.name,
                url: &endpoint.url,
                method: endpoint.method,
                expected_status: endpoint.expected_status,
                actual_status: run.status_code,
                response_time_ms: run.response_time_ms,
                is_success: run.is_success,
                error_message: run.error_message.as_deref(),
                performance: performance.as_ref(),
                drift: &schema_drift,
                failure_rate_percent: failure_rate,
            })
            .await;

        info!(
            "Anomaly analysis for {}: detected={} severity={:.0} ai_called={} fallback={}",
            endpoint.name,
            anomaly.anomaly_detected,
            anomaly.severity_score,
            anomaly.ai_called,
            anomaly.used_fallback,
        );

        // 9. Persist the anomaly row only when one was detected
        if anomaly.anomaly_detected {
            session
                .insert_anomaly(&AnomalyRecord::from_assessment(run.id, &anomaly))
                .await?;
        }

        // 10. Risk scoring always runs and is always persisted
        let risk = self.risk_engine.score(
            run.is_success,
            performance.as_ref(),
            &schema_drift,
            Some(&anomaly),
            failure_rate,
        );
        session.insert_risk(&risk_record(run.id, &risk)).await?;

        info!(
            "Risk for {}: score={:.1} level={} [status={:.0} perf={:.0} drift={:.0} ai={:.0} hist={:.0}]",
            endpoint.name,
            risk.calculated_score,
            risk.risk_level,
            risk.status_score,
            risk.performance_score,
            risk.drift_score,
            risk.ai_score,
            risk.history_score,
        );

        Ok(PipelineResult {
            run,
            performance,
            schema_drift,
            anomaly: Some(anomaly),
            risk,
            endpoint_name: endpoint.name,
            endpoint_url: endpoint.url,
            endpoint_method: endpoint.method,
        })
    }
}

fn risk_record(run_id: Uuid, risk: &RiskResult) -> RiskRecord {
    RiskRecord {
        id: Uuid::new_v4(),
        run_id,
        calculated_score: risk.calculated_score,
        risk_level: risk.risk_level,
        status_score: risk.status_score,
        performance_score: risk.performance_score,
        drift_score: risk.drift_score,
        ai_score: risk.ai_score,
        history_score: risk.history_score,
        created_at: Utc::now(),
    }
}
