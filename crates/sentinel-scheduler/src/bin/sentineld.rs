//! Sentinel monitoring daemon.
//!
//! Wires the pipeline together from environment configuration: storage,
//! the pooled HTTP clients, the model gateway, and the scheduler. Runs
//! until interrupted, then stops the scheduler before the clients so no
//! job fires against a torn-down stack.

use sentinel_ai::{AnomalyClassifier, LlmGateway};
use sentinel_alerts::{AlertDispatcher, WebhookClient};
use sentinel_common::Config;
use sentinel_executor::HttpExecutor;
use sentinel_pipeline::PipelineRunner;
use sentinel_scheduler::{MonitorScheduler, SchedulerDeps};
use sentinel_store::PgStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting sentineld v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let store = Arc::new(PgStore::connect(&config.database.url).await?);

    // Pooled clients start before any job can be scheduled
    let executor = Arc::new(HttpExecutor::new());
    executor.start().await?;

    let gateway = Arc::new(LlmGateway::new(config.ai.clone()));
    gateway.start().await?;

    let webhook = WebhookClient::new(config.webhook.clone());
    webhook.start().await?;

    let deps = Arc::new(SchedulerDeps {
        runner: PipelineRunner::new(
            store.clone(),
            executor.clone(),
            AnomalyClassifier::new(Some(gateway.clone())),
        ),
        dispatcher: AlertDispatcher::new(webhook, config.webhook.min_risk_level),
    });

    let scheduler = Arc::new(MonitorScheduler::new(
        config.scheduler.clone(),
        store,
        deps.clone(),
    ));
    scheduler.start().await;

    let report = scheduler.sync_jobs().await?;
    info!(
        "Initial job sync: added={} updated={} removed={} total={}",
        report.added, report.updated, report.removed, report.total
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    scheduler.stop().await;
    deps.dispatcher.webhook().stop().await;
    gateway.stop().await;
    executor.stop().await;

    info!("sentineld stopped");
    Ok(())
}
