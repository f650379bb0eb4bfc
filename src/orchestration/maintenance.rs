//! Periodic background upkeep.
//!
//! Three independent tasks, each with its own shutdown handle: resolution cache sweep,
//! history retention, and dead weak-reference pruning. None of them run inside request
//! paths.

use crate::config::MaintenanceConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub type MaintenanceJob = Arc<dyn Fn() -> usize + Send + Sync>;

/// Handle to one running periodic task
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    shutdown: Arc<Notify>,
    runs: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `job` every `interval`; the first pass runs immediately
    pub fn spawn(name: &'static str, interval: Duration, job: MaintenanceJob) -> Self {
        let shutdown = Arc::new(Notify::new());
        let runs = Arc::new(AtomicU64::new(0));

        let handle = {
            let shutdown = Arc::clone(&shutdown);
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = shutdown.notified() => {
                            debug!(task = name, "Maintenance task received shutdown");
                            break;
                        }
                        _ = ticker.tick() => {
                            let affected = job();
                            runs.fetch_add(1, Ordering::Relaxed);
                            if affected > 0 {
                                debug!(task = name, affected, "Maintenance pass");
                            }
                        }
                    }
                }
            })
        };

        Self {
            name,
            shutdown,
            runs,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the task and wait for it to exit
    pub async fn stop(self) {
        // notify_one keeps a permit if the task is mid-pass
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            warn!(task = self.name, error = %e, "Maintenance task ended abnormally");
        }
    }
}

/// Work performed by the scheduler's three tasks
pub struct MaintenanceJobs {
    pub sweep_cache: MaintenanceJob,
    /// Receives the configured retention age
    pub retain_history: Arc<dyn Fn(Duration) -> usize + Send + Sync>,
    pub prune_references: MaintenanceJob,
}

#[derive(Debug)]
pub struct MaintenanceScheduler {
    tasks: Vec<PeriodicTask>,
}

impl MaintenanceScheduler {
    pub fn start(config: &MaintenanceConfig, jobs: MaintenanceJobs) -> Self {
        let retention = config.history_retention();
        let retain_history = jobs.retain_history;

        let tasks = vec![
            PeriodicTask::spawn("cache_sweep", config.cache_sweep_interval(), jobs.sweep_cache),
            PeriodicTask::spawn(
                "history_retention",
                config.history_retention_interval(),
                Arc::new(move || retain_history(retention)),
            ),
            PeriodicTask::spawn(
                "reference_prune",
                config.reference_prune_interval(),
                jobs.prune_references,
            ),
        ];
        info!(tasks = tasks.len(), "Maintenance scheduler started");
        Self { tasks }
    }

    pub fn tasks(&self) -> &[PeriodicTask] {
        &self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&PeriodicTask> {
        self.tasks.iter().find(|task| task.name == name)
    }

    /// Stop a single task, leaving the others running
    pub async fn stop_task(&mut self, name: &str) -> bool {
        match self.tasks.iter().position(|task| task.name == name) {
            Some(index) => {
                self.tasks.remove(index).stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn shutdown(self) {
        for task in self.tasks {
            task.stop().await;
        }
        info!("Maintenance scheduler stopped");
    }
}
