//! Notification Dispatcher
//!
//! Fans a [`alerting::NotificationEvent`] out to every registered channel,
//! applies the mention policy, and keeps the presence indicator in step with
//! the monitored status.

mod discord;
mod dispatcher;
mod message;
mod presence;

pub use discord::{DiscordConfig, DiscordSink};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use message::{format_message, mention_line, smart_split, DRILL_PREFIX};
pub use presence::PresenceBoard;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from delivering one message
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Channel {channel_id} rejected message: HTTP {status}")]
    Rejected { channel_id: u64, status: u16 },
    #[error("Failed to reach channel {channel_id}: {message}")]
    Transport { channel_id: u64, message: String },
    #[error("Sink configuration error: {0}")]
    Config(String),
}

/// Outbound message channel, one call per target per event
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(
        &self,
        channel_id: u64,
        body: &str,
        mention_role_ids: &[u64],
        mention_user_ids: &[u64],
    ) -> Result<(), DispatchError>;
}

/// Process-wide presence indicator
pub trait PresenceSink: Send + Sync {
    fn set_presence(&self, status_label: &str);
}
