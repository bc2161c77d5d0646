//! Notification fan-out

use crate::message::format_message;
use crate::{MessageSink, PresenceSink};
use alerting::{MonitorStatus, NotificationEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::NotificationTarget;
use tracing::{info, warn};

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Name used in message headlines and presence labels
    pub service_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            service_name: "VRChat".to_string(),
        }
    }
}

/// Delivers notification events to every target and keeps presence current
pub struct Dispatcher {
    sink: Arc<dyn MessageSink>,
    presence: Arc<dyn PresenceSink>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn MessageSink>, presence: Arc<dyn PresenceSink>, config: DispatcherConfig) -> Self {
        Self { sink, presence, config }
    }

    /// Presence text for a status
    pub fn presence_label(&self, status: MonitorStatus) -> String {
        let service = &self.config.service_name;
        match status {
            MonitorStatus::Online => format!("{}: operating normally", service),
            MonitorStatus::Suspected => format!("Checking {}...", service),
            MonitorStatus::OutageActive => format!("{} outage in progress", service),
        }
    }

    /// Send `event` to every target and return how many channels accepted it.
    ///
    /// Role mentions are always included; subscribed users are only mentioned
    /// when the event asks for it. A failing channel is logged and skipped.
    /// Drill dispatches leave presence untouched.
    pub async fn dispatch(&self, event: &NotificationEvent, targets: &[NotificationTarget], drill: bool) -> usize {
        let body = format_message(event, &self.config.service_name, drill);
        let mut delivered = 0usize;

        for target in targets {
            let users: Vec<u64> = if event.mention_targets_requested {
                target.user_ids.iter().copied().collect()
            } else {
                Vec::new()
            };

            match self.sink.send(target.channel_id, &body, &target.role_ids, &users).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Notification to channel {} failed: {}", target.channel_id, e);
                    metrics::counter!("sentinel_dispatch_failures_total").increment(1);
                }
            }
        }

        metrics::counter!("sentinel_notifications_total").increment(delivered as u64);
        info!(
            "Dispatched {} -> {} to {}/{} channels{}",
            event.previous_status,
            event.new_status,
            delivered,
            targets.len(),
            if drill { " (drill)" } else { "" }
        );

        if !drill {
            self.refresh_presence(event.new_status);
        }
        delivered
    }

    /// Set presence for cycles that produced no event
    pub fn refresh_presence(&self, status: MonitorStatus) {
        self.presence.set_presence(&self.presence_label(status));
    }
}
