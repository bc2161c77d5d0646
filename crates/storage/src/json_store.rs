//! JSON document target store
//!
//! Document shape:
//!
//! ```json
//! {
//!   "channels": [111, {"channel_id": 222, "guild_id": 900}],
//!   "mentions": {"900": {"roles": [5], "users": [7, 8]}}
//! }
//! ```
//!
//! Bare channel ids are legacy registrations that never recorded a guild.
//! With a [`GuildResolver`] attached, each one is looked up on first read and
//! rewritten as a registered entry; without one they receive notices but no
//! mentions.

use crate::{GuildResolver, NotificationTarget, StorageError, TargetRegistry, TargetStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TargetDocument {
    #[serde(default)]
    channels: Vec<ChannelEntry>,
    #[serde(default)]
    mentions: BTreeMap<String, MentionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ChannelEntry {
    Registered {
        channel_id: u64,
        #[serde(default)]
        guild_id: Option<u64>,
    },
    Bare(u64),
}

impl ChannelEntry {
    fn channel_id(&self) -> u64 {
        match self {
            ChannelEntry::Registered { channel_id, .. } => *channel_id,
            ChannelEntry::Bare(id) => *id,
        }
    }

    fn guild_id(&self) -> Option<u64> {
        match self {
            ChannelEntry::Registered { guild_id, .. } => *guild_id,
            ChannelEntry::Bare(_) => None,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct MentionEntry {
    #[serde(default)]
    roles: Vec<u64>,
    #[serde(default)]
    users: Vec<u64>,
}

impl TargetDocument {
    fn targets(&self) -> Vec<NotificationTarget> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.channels.len());

        for entry in &self.channels {
            if !seen.insert(entry.channel_id()) {
                continue;
            }
            let mut target = NotificationTarget::channel(entry.channel_id());
            if let Some(guild_id) = entry.guild_id() {
                target = target.with_guild(guild_id);
                if let Some(mentions) = self.mentions.get(&guild_id.to_string()) {
                    for role in &mentions.roles {
                        target = target.with_role(*role);
                    }
                    target.user_ids = mentions.users.iter().copied().collect::<BTreeSet<_>>();
                }
            }
            targets.push(target);
        }
        targets
    }

    fn guild_mentions(&mut self, guild_id: u64) -> &mut MentionEntry {
        self.mentions.entry(guild_id.to_string()).or_default()
    }

    fn bare_channels(&self) -> Vec<u64> {
        self.channels
            .iter()
            .filter_map(|entry| match entry {
                ChannelEntry::Bare(id) => Some(*id),
                ChannelEntry::Registered { .. } => None,
            })
            .collect()
    }

    /// Replace bare entries with their looked-up guild
    fn upgrade_bare(&mut self, resolved: &BTreeMap<u64, Option<u64>>) -> bool {
        let mut changed = false;
        for entry in &mut self.channels {
            if let ChannelEntry::Bare(channel_id) = *entry {
                if let Some(guild_id) = resolved.get(&channel_id) {
                    *entry = ChannelEntry::Registered {
                        channel_id,
                        guild_id: *guild_id,
                    };
                    changed = true;
                }
            }
        }
        changed
    }
}

fn add_unique(ids: &mut Vec<u64>, id: u64) -> bool {
    if ids.contains(&id) {
        false
    } else {
        ids.push(id);
        true
    }
}

fn remove_id(ids: &mut Vec<u64>, id: u64) -> bool {
    let before = ids.len();
    ids.retain(|existing| *existing != id);
    ids.len() != before
}

/// Target store backed by a JSON file, re-read on every call
pub struct JsonTargetStore {
    path: PathBuf,
    /// Serializes read-modify-write updates
    write_gate: Mutex<()>,
    resolver: Option<Arc<dyn GuildResolver>>,
}

impl JsonTargetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Using target store at {}", path.display());
        Self {
            path,
            write_gate: Mutex::new(()),
            resolver: None,
        }
    }

    /// Look up guilds for legacy bare channel entries
    pub fn with_resolver(mut self, resolver: Arc<dyn GuildResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<TargetDocument, StorageError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Target store {} does not exist yet", self.path.display());
                return Ok(TargetDocument::default());
            }
            Err(e) => return Err(StorageError::Io(format!("{}: {}", self.path.display(), e))),
        };

        if raw.trim().is_empty() {
            return Ok(TargetDocument::default());
        }

        serde_json::from_str(&raw).map_err(|e| {
            warn!("Target store {} is malformed: {}", self.path.display(), e);
            StorageError::SerializationError(e.to_string())
        })
    }

    async fn save(&self, document: &TargetDocument) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(document)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", staging.display(), e)))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", self.path.display(), e)))
    }

    /// Apply `change` to the document and persist it if anything changed
    async fn update<F>(&self, change: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut TargetDocument) -> bool,
    {
        let _guard = self.write_gate.lock().await;
        let mut document = self.load().await?;
        let changed = change(&mut document);
        if changed {
            self.save(&document).await?;
        }
        Ok(changed)
    }

    /// Resolve bare entries; failed lookups stay bare and are retried on
    /// the next read.
    async fn resolve_bare(&self, document: &TargetDocument) -> BTreeMap<u64, Option<u64>> {
        let mut resolved = BTreeMap::new();
        let Some(resolver) = &self.resolver else {
            return resolved;
        };

        for channel_id in document.bare_channels() {
            match resolver.guild_of(channel_id).await {
                Ok(guild_id) => {
                    debug!("Legacy channel {} belongs to guild {:?}", channel_id, guild_id);
                    resolved.insert(channel_id, guild_id);
                }
                Err(e) => warn!("Could not resolve guild of channel {}: {}", channel_id, e),
            }
        }
        resolved
    }
}

#[async_trait]
impl TargetStore for JsonTargetStore {
    async fn list_targets(&self) -> Result<Vec<NotificationTarget>, StorageError> {
        let mut document = self.load().await?;

        let resolved = self.resolve_bare(&document).await;
        if document.upgrade_bare(&resolved) {
            match self.update(|doc| doc.upgrade_bare(&resolved)).await {
                Ok(_) => info!("Upgraded {} legacy channel entries", resolved.len()),
                Err(e) => warn!("Could not persist upgraded channel entries: {}", e),
            }
        }
        Ok(document.targets())
    }
}

#[async_trait]
impl TargetRegistry for JsonTargetStore {
    async fn add_channel(&self, channel_id: u64, guild_id: Option<u64>) -> Result<bool, StorageError> {
        let changed = self
            .update(|doc| {
                match doc.channels.iter_mut().find(|c| c.channel_id() == channel_id) {
                    Some(existing) if existing.guild_id().is_none() && guild_id.is_some() => {
                        *existing = ChannelEntry::Registered { channel_id, guild_id };
                        true
                    }
                    Some(_) => false,
                    None => {
                        doc.channels.push(ChannelEntry::Registered { channel_id, guild_id });
                        true
                    }
                }
            })
            .await?;
        if changed {
            info!("Registered notification channel {}", channel_id);
        }
        Ok(changed)
    }

    async fn remove_channel(&self, channel_id: u64) -> Result<bool, StorageError> {
        let changed = self
            .update(|doc| {
                let before = doc.channels.len();
                doc.channels.retain(|c| c.channel_id() != channel_id);
                doc.channels.len() != before
            })
            .await?;
        if changed {
            info!("Unregistered notification channel {}", channel_id);
        }
        Ok(changed)
    }

    async fn add_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StorageError> {
        self.update(|doc| add_unique(&mut doc.guild_mentions(guild_id).roles, role_id))
            .await
    }

    async fn remove_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StorageError> {
        self.update(|doc| remove_id(&mut doc.guild_mentions(guild_id).roles, role_id))
            .await
    }

    async fn subscribe_user(&self, guild_id: u64, user_id: u64) -> Result<bool, StorageError> {
        self.update(|doc| add_unique(&mut doc.guild_mentions(guild_id).users, user_id))
            .await
    }

    async fn unsubscribe_user(&self, guild_id: u64, user_id: u64) -> Result<bool, StorageError> {
        self.update(|doc| remove_id(&mut doc.guild_mentions(guild_id).users, user_id))
            .await
    }
}
