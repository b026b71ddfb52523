//! Periodic monitoring scheduler for the Sentinel pipeline
//!
//! Fans out one interval job per monitored endpoint with a process-wide
//! concurrency cap, reconciles the job set against the endpoint table,
//! and guarantees that a failing tick never takes the scheduler down.

pub mod jobs;
pub mod scheduler;

pub use jobs::{run_endpoint, SchedulerDeps};
pub use scheduler::{JobStatus, MonitorScheduler, SchedulerStatus, SyncReport};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_ai::AnomalyClassifier;
    use sentinel_alerts::{AlertDispatcher, WebhookClient};
    use sentinel_common::{
        EndpointSpec, HttpMethod, RiskLevel, SchedulerConfig, WebhookConfig,
    };
    use sentinel_executor::HttpExecutor;
    use sentinel_pipeline::PipelineRunner;
    use sentinel_store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(url: &str, interval_seconds: u32) -> EndpointSpec {
        EndpointSpec {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: format!("ep-{interval_seconds}"),
            url: url.to_string(),
            method: HttpMethod::GET,
            expected_status: 200,
            expected_schema: None,
            query_params: None,
            request_headers: None,
            cookies: None,
            auth: None,
            body: None,
            interval_seconds,
            created_at: Utc::now(),
        }
    }

    async fn make_scheduler(store: &MemoryStore, enabled: bool) -> Arc<MonitorScheduler> {
        let executor = Arc::new(HttpExecutor::new());
        executor.start().await.unwrap();

        let webhook = WebhookClient::new(WebhookConfig {
            enabled: false,
            url: String::new(),
            timeout_seconds: 1.0,
            min_risk_level: RiskLevel::Medium,
        });
        webhook.start().await.unwrap();

        let store: Arc<MemoryStore> = Arc::new(store.clone());
        let deps = Arc::new(SchedulerDeps {
            runner: PipelineRunner::new(store.clone(), executor, AnomalyClassifier::new(None)),
            dispatcher: AlertDispatcher::new(webhook, RiskLevel::Medium),
        });

        Arc::new(MonitorScheduler::new(
            SchedulerConfig {
                enabled,
                max_concurrent: 5,
                sync_interval_seconds: 3600,
            },
            store,
            deps,
        ))
    }

    #[tokio::test]
    async fn sync_reconciles_job_set_and_is_idempotent() {
        let store = MemoryStore::new();
        let a = endpoint("https://api.test/a", 60);
        let c = endpoint("https://api.test/c", 30);
        store.add_endpoint(a.clone());
        store.add_endpoint(c.clone());

        let scheduler = make_scheduler(&store, true).await;
        scheduler.start().await;

        let first = scheduler.sync_jobs().await.unwrap();
        assert_eq!(first.added, 2);
        assert_eq!(first.total, 2);

        // Endpoint C vanishes, endpoint B appears
        store.remove_endpoint(c.id);
        let b = endpoint("https://api.test/b", 120);
        store.add_endpoint(b.clone());

        let second = scheduler.sync_jobs().await.unwrap();
        assert_eq!(
            (second.added, second.updated, second.removed, second.total),
            (1, 0, 1, 2)
        );

        // No repository changes: the next sync is a no-op
        let third = scheduler.sync_jobs().await.unwrap();
        assert_eq!(
            (third.added, third.updated, third.removed, third.total),
            (0, 0, 0, 2)
        );

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn interval_change_reschedules_the_job() {
        let store = MemoryStore::new();
        let a = endpoint("https://api.test/a", 60);
        store.add_endpoint(a.clone());

        let scheduler = make_scheduler(&store, true).await;
        scheduler.start().await;
        scheduler.sync_jobs().await.unwrap();

        store.set_interval(a.id, 90);
        let report = scheduler.sync_jobs().await.unwrap();
        assert_eq!(
            (report.added, report.updated, report.removed, report.total),
            (0, 1, 0, 1)
        );

        let status = scheduler.status().await;
        assert_eq!(status.jobs[0].interval_seconds, 90);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn disabled_scheduler_never_runs() {
        let store = MemoryStore::new();
        let scheduler = make_scheduler(&store, false).await;
        scheduler.start().await;
        assert!(!scheduler.is_running().await);

        let report = scheduler.sync_jobs().await.unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[tokio::test]
    async fn status_reports_job_identifiers() {
        let store = MemoryStore::new();
        let a = endpoint("https://api.test/a", 60);
        store.add_endpoint(a.clone());

        let scheduler = make_scheduler(&store, true).await;
        scheduler.start().await;
        scheduler.sync_jobs().await.unwrap();

        let status = scheduler.status().await;
        assert!(status.running);
        assert_eq!(status.job_count, 1);
        assert_eq!(status.jobs[0].id, format!("monitor_{}", a.id));
        assert_eq!(status.jobs[0].endpoint_id, a.id);

        scheduler.stop().await;
        let status = scheduler.status().await;
        assert!(!status.running);
        assert_eq!(status.job_count, 0);
    }

    #[tokio::test]
    async fn job_ticks_persist_runs_until_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})),
            )
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let ep = endpoint(&server.uri(), 1);
        store.add_endpoint(ep.clone());

        let scheduler = make_scheduler(&store, true).await;
        scheduler.start().await;
        scheduler.sync_jobs().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1600)).await;
        scheduler.stop().await;

        let runs = store.runs_for(ep.id);
        assert!(!runs.is_empty());
        assert!(runs[0].is_success);
        // Every run committed together with its risk row
        for run in &runs {
            assert!(store.risk_for_run(run.id).is_some());
        }
    }

    #[tokio::test]
    async fn bad_job_input_never_panics() {
        let store = MemoryStore::new();
        let scheduler = make_scheduler(&store, true).await;
        scheduler.start().await;

        // Malformed id and unknown endpoint both log and return
        let deps = {
            let executor = Arc::new(HttpExecutor::new());
            executor.start().await.unwrap();
            let webhook = WebhookClient::new(WebhookConfig {
                enabled: false,
                url: String::new(),
                timeout_seconds: 1.0,
                min_risk_level: RiskLevel::Medium,
            });
            SchedulerDeps {
                runner: PipelineRunner::new(
                    Arc::new(store.clone()),
                    executor,
                    AnomalyClassifier::new(None),
                ),
                dispatcher: AlertDispatcher::new(webhook, RiskLevel::Medium),
            }
        };

        run_endpoint(&deps, "not-a-uuid").await;
        run_endpoint(&deps, &Uuid::new_v4().to_string()).await;

        scheduler.stop().await;
    }
}
