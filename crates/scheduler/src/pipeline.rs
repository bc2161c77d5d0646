//! Cycle Pipeline Implementation

use crate::PipelineError;
use alerting::{MonitorStatus, NotificationEvent, OutageState, OutageStateMachine};
use analysis::{Analyzer, Verdict};
use chrono::{DateTime, Utc};
use investigation::{InvestigationReport, Investigator};
use notifier::Dispatcher;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use storage::{NotificationTarget, TargetStore};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

/// Result of one completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub cycle_id: Uuid,
    /// Drill run on fabricated evidence
    pub synthetic: bool,
    pub verdict: Verdict,
    pub event: Option<NotificationEvent>,
    /// Status after the step (the clone's status for drills)
    pub status: MonitorStatus,
    pub notified_channels: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Point-in-time view for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: OutageState,
    pub last_verdict: Option<Verdict>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub cycles_idle: u64,
    pub drills_run: u64,
    pub notifications_sent: u64,
}

#[derive(Debug, Default)]
struct CycleStats {
    /// Copy of the live state as of the last commit
    state: OutageState,
    last_verdict: Option<Verdict>,
    last_cycle_at: Option<DateTime<Utc>>,
    cycles_completed: u64,
    cycles_failed: u64,
    cycles_idle: u64,
    drills_run: u64,
    notifications_sent: u64,
}

/// The monitoring pipeline and its live outage state
pub struct Pipeline {
    investigator: Investigator,
    analyzer: Analyzer,
    machine: OutageStateMachine,
    dispatcher: Dispatcher,
    store: Arc<dyn TargetStore>,
    service_name: String,
    /// Live state; held for the whole cycle so manual and scheduled runs never overlap
    gate: AsyncMutex<OutageState>,
    /// Counters and the last committed state, readable while a cycle runs
    stats: Mutex<CycleStats>,
}

impl Pipeline {
    pub fn new(
        investigator: Investigator,
        analyzer: Analyzer,
        machine: OutageStateMachine,
        dispatcher: Dispatcher,
        store: Arc<dyn TargetStore>,
        service_name: impl Into<String>,
    ) -> Self {
        let state = OutageState::new(Utc::now());
        Self {
            investigator,
            analyzer,
            machine,
            dispatcher,
            store,
            service_name: service_name.into(),
            gate: AsyncMutex::new(state.clone()),
            stats: Mutex::new(CycleStats {
                state,
                ..Default::default()
            }),
        }
    }

    pub async fn targets(&self) -> Result<Vec<NotificationTarget>, PipelineError> {
        Ok(self.store.list_targets().await?)
    }

    /// Run the full pipeline once.
    ///
    /// With `use_synthetic` the cycle is a drill: fabricated evidence, a
    /// disposable copy of the state, marked messages, and no presence change.
    /// The drill notice goes to every registered channel.
    pub async fn run_cycle(&self, use_synthetic: bool) -> Result<CycleOutcome, PipelineError> {
        self.run(use_synthetic, None).await
    }

    /// Drill whose notice goes to `channel_id` alone, without paging
    /// personal subscribers. The channel need not be registered.
    pub async fn run_drill_in(&self, channel_id: u64) -> Result<CycleOutcome, PipelineError> {
        self.run(true, Some(channel_id)).await
    }

    #[instrument(skip(self), fields(cycle_id = tracing::field::Empty))]
    async fn run(&self, use_synthetic: bool, drill_channel: Option<u64>) -> Result<CycleOutcome, PipelineError> {
        let cycle_id = Uuid::new_v4();
        Span::current().record("cycle_id", tracing::field::display(cycle_id));

        let result = self.execute(cycle_id, use_synthetic, drill_channel).await;
        match &result {
            Ok(outcome) => {
                metrics::counter!("sentinel_cycles_total").increment(1);
                self.with_stats(|stats| {
                    stats.notifications_sent += outcome.notified_channels as u64;
                    if outcome.synthetic {
                        stats.drills_run += 1;
                    } else {
                        stats.cycles_completed += 1;
                        stats.last_verdict = Some(outcome.verdict.clone());
                        stats.last_cycle_at = Some(outcome.finished_at);
                    }
                });
            }
            Err(e) => {
                error!("Cycle {} abandoned: {}", cycle_id, e);
                self.record_failure();
            }
        }
        result
    }

    async fn execute(
        &self,
        cycle_id: Uuid,
        use_synthetic: bool,
        drill_channel: Option<u64>,
    ) -> Result<CycleOutcome, PipelineError> {
        let mut live = self.gate.lock().await;
        let started_at = Utc::now();
        info!("Cycle {} started{}", cycle_id, if use_synthetic { " (drill)" } else { "" });

        let mut targets = self.targets().await?;
        if let Some(channel_id) = drill_channel {
            targets = vec![drill_target(targets, channel_id)];
        }

        let report = if use_synthetic {
            InvestigationReport::synthetic_outage(&self.service_name, started_at)
        } else {
            self.investigator.investigate().await
        };

        let verdict = self.analyzer.analyze(&report).await;
        let transition = self.machine.step(&live, &verdict, Utc::now());

        if !use_synthetic {
            *live = transition.state.clone();
            self.with_stats(|stats| stats.state = transition.state.clone());
        }
        let status = transition.state.current_status;

        let notified_channels = match &transition.event {
            Some(event) => self.dispatcher.dispatch(event, &targets, use_synthetic).await,
            None => {
                if !use_synthetic {
                    self.dispatcher.refresh_presence(status);
                }
                0
            }
        };

        let finished_at = Utc::now();
        info!(
            "Cycle {} finished: status={}, event={}, notified={}",
            cycle_id,
            status,
            transition.event.is_some(),
            notified_channels
        );

        Ok(CycleOutcome {
            cycle_id,
            synthetic: use_synthetic,
            verdict,
            event: transition.event,
            status,
            notified_channels,
            started_at,
            finished_at,
        })
    }

    /// Last committed state and counters. Does not wait for a running cycle.
    pub fn snapshot(&self) -> StatusSnapshot {
        let stats = match self.stats.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        StatusSnapshot {
            state: stats.state.clone(),
            last_verdict: stats.last_verdict.clone(),
            last_cycle_at: stats.last_cycle_at,
            cycles_completed: stats.cycles_completed,
            cycles_failed: stats.cycles_failed,
            cycles_idle: stats.cycles_idle,
            drills_run: stats.drills_run,
            notifications_sent: stats.notifications_sent,
        }
    }

    pub(crate) fn record_failure(&self) {
        metrics::counter!("sentinel_cycles_failed_total").increment(1);
        self.with_stats(|stats| stats.cycles_failed += 1);
    }

    pub(crate) fn record_idle(&self) {
        metrics::counter!("sentinel_cycles_idle_total").increment(1);
        self.with_stats(|stats| stats.cycles_idle += 1);
    }

    fn with_stats<F: FnOnce(&mut CycleStats)>(&self, update: F) {
        match self.stats.lock() {
            Ok(mut stats) => update(&mut stats),
            Err(poisoned) => {
                warn!("Cycle stats lock was poisoned, recovering");
                update(&mut poisoned.into_inner());
            }
        }
    }
}

/// The registered entry for `channel_id` with its role mentions, or a bare
/// channel; personal subscribers are never paged by a drill.
fn drill_target(targets: Vec<NotificationTarget>, channel_id: u64) -> NotificationTarget {
    let mut target = targets
        .into_iter()
        .find(|t| t.channel_id == channel_id)
        .unwrap_or_else(|| NotificationTarget::channel(channel_id));
    target.user_ids.clear();
    target
}

#[cfg(test)]
mod tests {
    use crate::testing::{fixture, reply};
    use alerting::MonitorStatus;

    #[tokio::test]
    async fn test_suspected_streak_notifies_twice() {
        let fx = fixture(vec![
            reply("normal", 0.9),
            reply("normal", 0.9),
            reply("suspected", 0.6),
            reply("suspected", 0.6),
            reply("suspected", 0.6),
        ]);

        let mut statuses = Vec::new();
        let mut events = 0;
        for _ in 0..5 {
            let outcome = fx.pipeline.run_cycle(false).await.unwrap();
            statuses.push(outcome.status);
            events += usize::from(outcome.event.is_some());
        }

        assert_eq!(
            statuses,
            vec![
                MonitorStatus::Online,
                MonitorStatus::Online,
                MonitorStatus::Suspected,
                MonitorStatus::Suspected,
                MonitorStatus::OutageActive,
            ]
        );
        assert_eq!(events, 2);
        // Two events to two channels
        assert_eq!(fx.sink.sent().len(), 4);
        assert_eq!(fx.presence.label(), "VRChat outage in progress");

        let snapshot = fx.pipeline.snapshot();
        assert_eq!(snapshot.cycles_completed, 5);
        assert_eq!(snapshot.notifications_sent, 4);
        assert_eq!(snapshot.state.current_status, MonitorStatus::OutageActive);
    }

    #[tokio::test]
    async fn test_recovery_pages_roles_only() {
        let fx = fixture(vec![
            reply("confirmed", 0.95),
            reply("confirmed", 0.95),
            reply("normal", 0.9),
        ]);
        for _ in 0..3 {
            fx.pipeline.run_cycle(false).await.unwrap();
        }

        let sent = fx.sink.sent();
        let outage: Vec<_> = sent.iter().filter(|s| s.body.starts_with("[OUTAGE]")).collect();
        let recovery: Vec<_> = sent.iter().filter(|s| s.body.starts_with("[RECOVERED]")).collect();
        assert_eq!(outage.len(), 2);
        assert_eq!(recovery.len(), 2);

        let paged = outage.iter().find(|s| s.channel_id == 1).unwrap();
        assert_eq!(paged.roles, vec![10]);
        assert_eq!(paged.users, vec![20]);

        let recovered = recovery.iter().find(|s| s.channel_id == 1).unwrap();
        assert_eq!(recovered.roles, vec![10]);
        assert!(recovery.iter().all(|s| s.users.is_empty()));
        assert_eq!(fx.presence.label(), "VRChat: operating normally");
    }

    #[tokio::test]
    async fn test_drill_leaves_live_state_untouched() {
        let fx = fixture(vec![reply("confirmed", 0.95), reply("confirmed", 0.95)]);
        fx.pipeline.run_cycle(false).await.unwrap();
        let before = fx.pipeline.snapshot();
        let provider_calls = fx.provider.calls();
        assert_eq!(before.state.current_status, MonitorStatus::Suspected);

        let outcome = fx.pipeline.run_cycle(true).await.unwrap();
        assert!(outcome.synthetic);
        assert_eq!(outcome.status, MonitorStatus::OutageActive);
        assert!(outcome.event.is_some());

        let after = fx.pipeline.snapshot();
        assert_eq!(after.state, before.state);
        assert_eq!(after.last_verdict, before.last_verdict);
        assert_eq!(after.drills_run, 1);
        assert_eq!(fx.provider.calls(), provider_calls);

        let drill_messages: Vec<_> = fx.sink.sent().into_iter().filter(|s| s.body.starts_with("[DRILL] ")).collect();
        assert_eq!(drill_messages.len(), 2);
        assert_eq!(fx.presence.label(), "Checking VRChat...");
    }

    #[tokio::test]
    async fn test_channel_drill_reaches_only_that_channel() {
        let fx = fixture(vec![reply("confirmed", 0.95), reply("confirmed", 0.95)]);

        let outcome = fx.pipeline.run_drill_in(1).await.unwrap();
        assert!(outcome.synthetic);
        assert_eq!(outcome.notified_channels, 1);

        let sent = fx.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel_id, 1);
        assert!(sent[0].body.starts_with("[DRILL] "));
        assert_eq!(sent[0].roles, vec![10]);
        assert!(sent[0].users.is_empty());

        // Unregistered channels still get the drill, without mentions
        fx.pipeline.run_drill_in(77).await.unwrap();
        let sent = fx.sink.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].channel_id, 77);
        assert!(sent[1].roles.is_empty());

        let snapshot = fx.pipeline.snapshot();
        assert_eq!(snapshot.drills_run, 2);
        assert_eq!(snapshot.state.current_status, MonitorStatus::Online);
    }

    #[tokio::test]
    async fn test_malformed_replies_hold_state() {
        let fx = fixture(vec!["not json".to_string(), "{\"severity\": \"bad\"}".to_string()]);

        let outcome = fx.pipeline.run_cycle(false).await.unwrap();
        assert_eq!(outcome.verdict.origin, analysis::VerdictOrigin::Fallback);
        assert!(outcome.event.is_none());
        assert!(fx.sink.sent().is_empty());
        assert_eq!(fx.presence.label(), "VRChat: operating normally");
    }

    #[tokio::test]
    async fn test_store_failure_abandons_cycle() {
        let fx = fixture(vec![reply("confirmed", 0.95)]);
        fx.store.fail_next();

        assert!(fx.pipeline.run_cycle(false).await.is_err());
        let snapshot = fx.pipeline.snapshot();
        assert_eq!(snapshot.cycles_failed, 1);
        assert_eq!(snapshot.state.current_status, MonitorStatus::Online);
        assert_eq!(fx.provider.calls(), 0);
    }
}
