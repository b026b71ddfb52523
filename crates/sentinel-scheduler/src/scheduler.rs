//! Periodic monitoring scheduler.
//!
//! Maintains one interval task per endpoint, identified by
//! `monitor_<endpoint_id>`. Each job loop is sequential, so runs of the
//! same endpoint never overlap; a process-wide semaphore caps how many
//! jobs execute concurrently across endpoints. `sync_jobs` reconciles the
//! job set against the endpoint table, and a background loop repeats that
//! reconciliation so database edits propagate without restarts.

use crate::jobs::{run_endpoint, SchedulerDeps};
use chrono::{DateTime, Utc};
use sentinel_common::{EndpointId, Result, SchedulerConfig};
use sentinel_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Summary of one job-set reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub total: usize,
}

/// One scheduled job's public description
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobStatus {
    pub id: String,
    pub endpoint_id: EndpointId,
    pub interval_seconds: u32,
}

/// Scheduler status for logs and operators
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub enabled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub job_count: usize,
    pub jobs: Vec<JobStatus>,
}

struct JobEntry {
    endpoint_id: EndpointId,
    interval_seconds: u32,
    handle: JoinHandle<()>,
}

struct SchedulerState {
    jobs: HashMap<String, JobEntry>,
    limiter: Arc<Semaphore>,
    started_at: DateTime<Utc>,
    sync_handle: Option<JoinHandle<()>>,
}

/// Lifecycle wrapper around the per-endpoint job set.
///
/// Call [`start`](MonitorScheduler::start) and
/// [`stop`](MonitorScheduler::stop) from the daemon lifespan, and
/// [`sync_jobs`](MonitorScheduler::sync_jobs) after start to load
/// endpoints from the store.
pub struct MonitorScheduler {
    config: SchedulerConfig,
    store: Arc<dyn Store>,
    deps: Arc<SchedulerDeps>,
    state: Mutex<Option<SchedulerState>>,
}

impl MonitorScheduler {
    pub fn new(config: SchedulerConfig, store: Arc<dyn Store>, deps: Arc<SchedulerDeps>) -> Self {
        MonitorScheduler {
            config,
            store,
            deps,
            state: Mutex::new(None),
        }
    }

    /// Start the scheduler with an empty job set. Idempotent; a no-op
    /// when disabled by configuration.
    pub async fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!("Scheduler disabled via configuration");
            return;
        }

        let mut state = self.state.lock().await;
        if state.is_some() {
            warn!("Scheduler already started — skipping");
            return;
        }

        let sync_handle = self.spawn_sync_loop();
        *state = Some(SchedulerState {
            jobs: HashMap::new(),
            limiter: Arc::new(Semaphore::new(self.config.max_concurrent.max(1))),
            started_at: Utc::now(),
            sync_handle: Some(sync_handle),
        });

        info!(
            "Scheduler started (max_concurrent={})",
            self.config.max_concurrent
        );
    }

    /// Stop immediately: cancel pending firings and abandon in-flight
    /// jobs at their next await point.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Some(mut state) = state.take() else {
            return;
        };

        if let Some(handle) = state.sync_handle.take() {
            handle.abort();
        }
        for (job_id, entry) in state.jobs.drain() {
            entry.handle.abort();
            info!("Cancelled job {job_id}");
        }
        info!("Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Synchronise the job set with the current endpoint table.
    ///
    /// Adds jobs for new endpoints, reschedules jobs whose interval
    /// changed, and removes jobs for endpoints that no longer exist.
    /// Running it twice with no repository changes is a no-op the second
    /// time.
    pub async fn sync_jobs(self: &Arc<Self>) -> Result<SyncReport> {
        let mut session = self.store.session().await?;
        let endpoints = session.list_endpoints().await?;
        // Read-only session; nothing to commit
        session.rollback().await?;

        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else {
            warn!("sync_jobs called but scheduler is not running");
            return Ok(SyncReport::default());
        };

        let desired: HashMap<String, (&sentinel_common::EndpointSpec, u32)> = endpoints
            .iter()
            .map(|e| (format!("monitor_{}", e.id), (e, e.interval_seconds)))
            .collect();

        let mut report = SyncReport::default();

        // Remove jobs for deleted endpoints
        let stale: Vec<String> = state
            .jobs
            .keys()
            .filter(|id| !desired.contains_key(*id))
            .cloned()
            .collect();
        for job_id in stale {
            if let Some(entry) = state.jobs.remove(&job_id) {
                entry.handle.abort();
                report.removed += 1;
                info!("Removed job {job_id} (endpoint deleted)");
            }
        }

        // Add new jobs and reschedule changed intervals
        for (job_id, (endpoint, interval)) in &desired {
            let previous_interval = match state.jobs.get(job_id) {
                Some(entry) if entry.interval_seconds == *interval => continue,
                Some(entry) => Some(entry.interval_seconds),
                None => None,
            };

            if let Some(entry) = state.jobs.remove(job_id) {
                entry.handle.abort();
            }
            let handle = self.spawn_job(state.limiter.clone(), endpoint.id, *interval);
            state.jobs.insert(
                job_id.clone(),
                JobEntry {
                    endpoint_id: endpoint.id,
                    interval_seconds: *interval,
                    handle,
                },
            );

            match previous_interval {
                Some(old) => {
                    report.updated += 1;
                    info!("Updated job {job_id}: interval {old}s to {interval}s");
                }
                None => {
                    report.added += 1;
                    info!("Added job {job_id} ({} every {interval}s)", endpoint.name);
                }
            }
        }

        report.total = state.jobs.len();
        info!(
            "Job sync complete: added={} updated={} removed={} total={}",
            report.added, report.updated, report.removed, report.total
        );
        Ok(report)
    }

    /// Scheduler status snapshot
    pub async fn status(&self) -> SchedulerStatus {
        let guard = self.state.lock().await;
        match guard.as_ref() {
            Some(state) => {
                let mut jobs: Vec<JobStatus> = state
                    .jobs
                    .iter()
                    .map(|(id, entry)| JobStatus {
                        id: id.clone(),
                        endpoint_id: entry.endpoint_id,
                        interval_seconds: entry.interval_seconds,
                    })
                    .collect();
                jobs.sort_by(|a, b| a.id.cmp(&b.id));
                SchedulerStatus {
                    running: true,
                    enabled: self.config.enabled,
                    started_at: Some(state.started_at),
                    job_count: jobs.len(),
                    jobs,
                }
            }
            None => SchedulerStatus {
                running: false,
                enabled: self.config.enabled,
                started_at: None,
                job_count: 0,
                jobs: Vec::new(),
            },
        }
    }

    /// Spawn one endpoint's interval loop. The first firing happens one
    /// interval after scheduling; missed ticks coalesce into one.
    fn spawn_job(
        &self,
        limiter: Arc<Semaphore>,
        endpoint_id: EndpointId,
        interval_seconds: u32,
    ) -> JoinHandle<()> {
        let deps = self.deps.clone();
        let endpoint_id = endpoint_id.to_string();
        let period = Duration::from_secs(u64::from(interval_seconds.max(1)));

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let permit = match limiter.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                run_endpoint(&deps, &endpoint_id).await;
                drop(permit);
            }
        })
    }

    /// Background reconciliation so endpoint table edits propagate
    fn spawn_sync_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let period = Duration::from_secs(self.config.sync_interval_seconds.max(1));

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.sync_jobs().await {
                    error!("Periodic job sync failed: {e}");
                }
            }
        })
    }
}
