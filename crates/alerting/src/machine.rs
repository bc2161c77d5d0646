//! Outage State Machine Implementation

use crate::state::{MonitorStatus, NotificationEvent, OutageState};
use analysis::{Severity, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// State machine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMachineConfig {
    /// Minimum confidence for Online -> Suspected (default: 0.5)
    pub suspect_threshold: f64,
    /// Minimum confidence of a confirmed verdict for Suspected -> OutageActive (default: 0.8)
    pub confirm_threshold: f64,
    /// Suspected cycles that escalate to an outage on their own (default: 3)
    pub suspected_streak: u32,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            suspect_threshold: 0.5,
            confirm_threshold: 0.8,
            suspected_streak: 3,
        }
    }
}

/// Result of applying one verdict
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State to commit
    pub state: OutageState,
    /// Notification to deliver, if the status changed
    pub event: Option<NotificationEvent>,
}

/// Applies hysteresis and debounce rules to the verdict stream.
///
/// The machine is pure: it reads a state and returns the next one, leaving
/// the commit to the caller.
#[derive(Debug, Clone, Default)]
pub struct OutageStateMachine {
    config: StateMachineConfig,
}

impl OutageStateMachine {
    /// Create a new state machine
    pub fn new(config: StateMachineConfig) -> Self {
        info!("Creating outage state machine with config: {:?}", config);
        Self { config }
    }

    /// Apply one verdict to `state`.
    pub fn step(&self, state: &OutageState, verdict: &Verdict, now: DateTime<Utc>) -> Transition {
        if !verdict.is_actionable() {
            warn!(
                "Verdict is {:?}, holding {} without transition",
                verdict.origin, state.current_status
            );
            return Transition {
                state: state.clone(),
                event: None,
            };
        }

        let mut next = state.clone();
        let non_normal = verdict.severity != Severity::Normal;

        match state.current_status {
            MonitorStatus::Online => {
                if non_normal && verdict.confidence >= self.config.suspect_threshold {
                    next.current_status = MonitorStatus::Suspected;
                    next.consecutive_suspected_count = 1;
                }
            }
            MonitorStatus::Suspected => {
                if non_normal {
                    next.consecutive_suspected_count = state.consecutive_suspected_count.saturating_add(1);
                    let strongly_confirmed = verdict.severity == Severity::Confirmed
                        && verdict.confidence >= self.config.confirm_threshold;
                    let streak_reached = next.consecutive_suspected_count >= self.config.suspected_streak;

                    if strongly_confirmed || streak_reached {
                        next.current_status = MonitorStatus::OutageActive;
                        next.consecutive_suspected_count = 0;
                    } else {
                        debug!(
                            "Still suspected ({}/{})",
                            next.consecutive_suspected_count, self.config.suspected_streak
                        );
                    }
                } else {
                    next.current_status = MonitorStatus::Online;
                    next.consecutive_suspected_count = 0;
                }
            }
            MonitorStatus::OutageActive => {
                if !non_normal {
                    next.current_status = MonitorStatus::Online;
                }
            }
        }

        if next.current_status != state.current_status {
            next.last_transition_at = now;
            info!("Status change: {} -> {}", state.current_status, next.current_status);
        }

        let event = if next.current_status != next.last_notified_status {
            let event = NotificationEvent {
                previous_status: next.last_notified_status,
                new_status: next.current_status,
                verdict_summary: verdict.summary.clone(),
                mention_targets_requested: next.current_status.is_degradation_from(next.last_notified_status),
                emitted_at: now,
            };
            next.last_notified_status = next.current_status;
            Some(event)
        } else {
            None
        };

        Transition { state: next, event }
    }
}
