//! Outage state and notification events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known status of the monitored service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Online,
    Suspected,
    OutageActive,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Online => "online",
            MonitorStatus::Suspected => "suspected",
            MonitorStatus::OutageActive => "outage_active",
        }
    }

    /// Whether moving from `previous` to `self` makes things worse
    pub fn is_degradation_from(&self, previous: MonitorStatus) -> bool {
        *self > previous
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single piece of long-lived mutable core state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutageState {
    pub current_status: MonitorStatus,
    /// Status at the time of the last dispatched notification
    pub last_notified_status: MonitorStatus,
    pub last_transition_at: DateTime<Utc>,
    /// Cycles spent in `Suspected` with a non-normal verdict
    pub consecutive_suspected_count: u32,
}

impl OutageState {
    /// Fresh state at process start
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current_status: MonitorStatus::Online,
            last_notified_status: MonitorStatus::Online,
            last_transition_at: now,
            consecutive_suspected_count: 0,
        }
    }
}

impl Default for OutageState {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// A notification that must be delivered, produced only on a status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub previous_status: MonitorStatus,
    pub new_status: MonitorStatus,
    pub verdict_summary: String,
    /// Personal subscribers are paged only for degradations
    pub mention_targets_requested: bool,
    pub emitted_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn is_recovery(&self) -> bool {
        self.new_status < self.previous_status
    }
}
