//! Scheduled monitoring jobs.
//!
//! One self-contained tick per endpoint firing: validate the id, run the
//! full pipeline over a fresh storage session, then dispatch the alert
//! after the commit so persisted data survives webhook failures. A tick
//! never propagates an error; this is the firewall between pipeline bugs
//! and scheduler availability.

use sentinel_alerts::AlertDispatcher;
use sentinel_pipeline::PipelineRunner;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Everything a job tick needs
pub struct SchedulerDeps {
    pub runner: PipelineRunner,
    pub dispatcher: AlertDispatcher,
}

/// Execute the full monitoring pipeline for a single endpoint.
///
/// This is the function every interval tick calls. All errors are logged
/// and swallowed so the scheduler keeps running other jobs.
pub async fn run_endpoint(deps: &SchedulerDeps, endpoint_id: &str) {
    let eid = match Uuid::parse_str(endpoint_id) {
        Ok(id) => id,
        Err(_) => {
            error!("Invalid endpoint id passed to job: {endpoint_id}");
            return;
        }
    };

    debug!("Scheduler job started for endpoint {eid}");

    let pipeline = match deps.runner.execute_endpoint(eid, None).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Scheduler job failed for endpoint {eid}: {e}");
            return;
        }
    };

    info!(
        "Scheduler job completed for endpoint {eid}: success={} risk={:.1}({})",
        pipeline.run.is_success, pipeline.risk.calculated_score, pipeline.risk.risk_level,
    );

    // Alert dispatch happens after the commit; a webhook failure must not
    // disturb persisted state.
    let outcome = deps.dispatcher.maybe_alert(&pipeline).await;
    if outcome.alerted {
        info!(
            "Alert dispatched for {}: delivered={}",
            pipeline.endpoint_name, outcome.delivered,
        );
    }
}
