use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::state::SharedState;

/// Drives the maintenance jobs: the retention sweep (ledger + idle windows)
/// and cache eviction. Both run on their own cadence, decoupled from
/// request traffic.
pub struct Scheduler {
    state: Arc<SharedState>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(state: Arc<SharedState>, config: SchedulerConfig) -> Self {
        Self {
            state,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        if let Some(cron_expr) = &self.config.sweep_cron {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let running = Arc::clone(&self.running);

        // Retention sweep job
        let state_for_sweep = Arc::clone(&self.state);
        let sweep_job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let state = Arc::clone(&state_for_sweep);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                let start = std::time::Instant::now();
                info!(event = "job_started", job_name = "retention_sweep", "Starting scheduled retention sweep");

                if let Err(e) = state.sweep_service.run_retention_sweep().await {
                    error!(event = "job_failed", job_name = "retention_sweep", error = %e, "Scheduled retention sweep failed");
                }

                info!(
                    event = "job_finished",
                    job_name = "retention_sweep",
                    duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Scheduled retention sweep finished"
                );
            })
        })?;

        // Cache eviction job
        let evict_minutes = self.config.evict_interval_minutes.max(1);
        let evict_cron = if evict_minutes >= 60 {
            // Hourly on the hour when the interval caps out
            "0 0 * * * *".to_string()
        } else {
            format!("0 */{evict_minutes} * * * *")
        };

        let state_for_evict = Arc::clone(&self.state);
        let evict_job = Job::new_async(&evict_cron, move |_uuid, _lock| {
            let state = Arc::clone(&state_for_evict);
            Box::pin(async move {
                if let Err(e) = state.sweep_service.run_cache_eviction().await {
                    error!("Scheduled cache eviction failed: {}", e);
                }
            })
        })?;

        sched.add(sweep_job).await?;
        sched.add(evict_job).await?;
        sched.start().await?;

        info!("Scheduler running with sweep cron: {}", cron_expr);
        info!("Cache eviction scheduled: {}", evict_cron);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let sweep_mins = self.config.sweep_interval_minutes.max(1);
        let evict_mins = self.config.evict_interval_minutes.max(1);

        info!(
            "Scheduler running: Sweep every {}m, Eviction every {}m",
            sweep_mins, evict_mins
        );

        let mut sweep_interval = interval(Duration::from_secs(u64::from(sweep_mins) * 60));
        let mut evict_interval = interval(Duration::from_secs(u64::from(evict_mins) * 60));

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                    let start = std::time::Instant::now();
                    info!(event = "job_started", job_name = "retention_sweep", "Starting scheduled retention sweep");

                    if let Err(e) = self.state.sweep_service.run_retention_sweep().await {
                        error!(event = "job_failed", job_name = "retention_sweep", error = %e, "Scheduled retention sweep failed");
                    }

                    info!(
                        event = "job_finished",
                        job_name = "retention_sweep",
                        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Scheduled retention sweep finished"
                    );
                }
                _ = evict_interval.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                    if let Err(e) = self.state.sweep_service.run_cache_eviction().await {
                        error!(event = "job_failed", job_name = "cache_eviction", error = %e, "Scheduled cache eviction failed");
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn run_once(&self) -> Result<()> {
        info!("Running manual sweep...");

        self.state.sweep_service.run_retention_sweep().await?;
        self.state.sweep_service.run_cache_eviction().await?;

        Ok(())
    }
}
