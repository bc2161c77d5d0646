//! Storage Layer
//!
//! Holds the registered notification targets: which channels receive
//! outage notices and which roles and users get mentioned in them. The
//! pipeline only ever reads through [`TargetStore`]; registration goes
//! through [`TargetRegistry`].

mod json_store;
mod memory;
mod target;

pub use json_store::JsonTargetStore;
pub use memory::InMemoryTargetStore;
pub use target::NotificationTarget;

use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store I/O error: {0}")]
    Io(String),
    #[error("Target not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Guild lookup failed: {0}")]
    Lookup(String),
}

/// Read side of the target store
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Current registered targets. Changes made between calls are visible on
    /// the next call.
    async fn list_targets(&self) -> Result<Vec<NotificationTarget>, StorageError>;
}

/// Write side of the target store. Each call reports whether anything
/// changed.
#[async_trait]
pub trait TargetRegistry: TargetStore {
    /// Register a channel, or attach a guild to a legacy registration
    async fn add_channel(&self, channel_id: u64, guild_id: Option<u64>) -> Result<bool, StorageError>;
    async fn remove_channel(&self, channel_id: u64) -> Result<bool, StorageError>;
    /// Mention `role_id` on every notice sent to the guild's channels
    async fn add_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StorageError>;
    async fn remove_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StorageError>;
    /// Page `user_id` on degradations in the guild's channels
    async fn subscribe_user(&self, guild_id: u64, user_id: u64) -> Result<bool, StorageError>;
    async fn unsubscribe_user(&self, guild_id: u64, user_id: u64) -> Result<bool, StorageError>;
}

/// Finds the guild a channel belongs to
#[async_trait]
pub trait GuildResolver: Send + Sync {
    /// `Ok(None)` when the channel exists outside any guild
    async fn guild_of(&self, channel_id: u64) -> Result<Option<u64>, StorageError>;
}
