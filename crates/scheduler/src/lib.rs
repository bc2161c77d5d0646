//! Monitoring Scheduler
//!
//! [`Pipeline`] runs one `investigate -> analyze -> state machine -> dispatch`
//! cycle behind a single gate on the outage state. [`MonitorScheduler`] drives
//! it on a fixed interval while at least one notification target exists.

mod pipeline;
mod runner;

#[cfg(test)]
mod testing;

pub use pipeline::{CycleOutcome, Pipeline, StatusSnapshot};
pub use runner::{MonitorScheduler, SchedulerConfig, TickOutcome};

use thiserror::Error;

/// Errors that abandon a cycle
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to load notification targets: {0}")]
    Targets(#[from] storage::StorageError),
    #[error("Cycle aborted: {0}")]
    Aborted(String),
}
