//! Polling Scheduler Implementation

use crate::{CycleOutcome, Pipeline};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Configuration for the polling scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between cycles (default: 600)
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { interval_secs: 600 }
    }
}

/// What one scheduled tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// No targets registered; nothing was called
    Idle,
    Completed(Box<CycleOutcome>),
    Failed,
}

/// Drives the pipeline on a fixed cadence
pub struct MonitorScheduler {
    pipeline: Arc<Pipeline>,
    config: SchedulerConfig,
    shutdown: watch::Sender<bool>,
}

impl MonitorScheduler {
    pub fn new(pipeline: Arc<Pipeline>, config: SchedulerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        info!("Monitor scheduler created with {}s interval", config.interval_secs);
        Self {
            pipeline,
            config,
            shutdown,
        }
    }

    /// Ask the loop to exit. A cycle already in flight runs to completion.
    pub fn stop(&self) {
        info!("Stopping monitor scheduler");
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run until [`stop`](Self::stop) is called. The first cycle runs immediately.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Monitor scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }
            self.tick().await;
        }

        info!("Monitor scheduler stopped");
    }

    /// One scheduled tick: idle without targets, otherwise a full cycle in
    /// its own task so a panic is contained to that cycle.
    pub async fn tick(&self) -> TickOutcome {
        match self.pipeline.targets().await {
            Ok(targets) if targets.is_empty() => {
                debug!("No notification targets registered, idling");
                self.pipeline.record_idle();
                return TickOutcome::Idle;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Skipping cycle: {}", e);
                self.pipeline.record_failure();
                return TickOutcome::Failed;
            }
        }

        let pipeline = Arc::clone(&self.pipeline);
        match tokio::spawn(async move { pipeline.run_cycle(false).await }).await {
            Ok(Ok(outcome)) => TickOutcome::Completed(Box::new(outcome)),
            // Already logged and counted by the pipeline
            Ok(Err(_)) => TickOutcome::Failed,
            Err(join_error) => {
                error!("Cycle task died: {}", join_error);
                self.pipeline.record_failure();
                TickOutcome::Failed
            }
        }
    }
}
