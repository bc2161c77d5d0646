//! In-memory target store

use crate::{NotificationTarget, StorageError, TargetStore};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{debug, info};

/// Target store held in process memory
#[derive(Debug, Default)]
pub struct InMemoryTargetStore {
    targets: Mutex<Vec<NotificationTarget>>,
}

impl InMemoryTargetStore {
    pub fn new(targets: Vec<NotificationTarget>) -> Self {
        info!("Creating in-memory target store with {} targets", targets.len());
        Self {
            targets: Mutex::new(targets),
        }
    }

    /// Register a target, replacing any existing entry for the same channel
    pub fn upsert(&self, target: NotificationTarget) -> Result<(), StorageError> {
        let mut targets = self
            .targets
            .lock()
            .map_err(|e| StorageError::Io(format!("Lock error: {}", e)))?;

        match targets.iter_mut().find(|t| t.channel_id == target.channel_id) {
            Some(existing) => *existing = target,
            None => targets.push(target),
        }
        Ok(())
    }

    pub fn remove(&self, channel_id: u64) -> Result<NotificationTarget, StorageError> {
        let mut targets = self
            .targets
            .lock()
            .map_err(|e| StorageError::Io(format!("Lock error: {}", e)))?;

        let index = targets
            .iter()
            .position(|t| t.channel_id == channel_id)
            .ok_or_else(|| StorageError::NotFound(format!("channel {}", channel_id)))?;
        debug!("Removed target channel {}", channel_id);
        Ok(targets.remove(index))
    }
}

#[async_trait]
impl TargetStore for InMemoryTargetStore {
    async fn list_targets(&self) -> Result<Vec<NotificationTarget>, StorageError> {
        let targets = self
            .targets
            .lock()
            .map_err(|e| StorageError::Io(format!("Lock error: {}", e)))?;
        Ok(targets.clone())
    }
}
