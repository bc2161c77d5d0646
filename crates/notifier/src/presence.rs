//! Presence indicator

use crate::PresenceSink;
use std::sync::RwLock;
use tracing::{info, warn};

/// Holds the current presence label for the gateway layer and the admin API
#[derive(Debug, Default)]
pub struct PresenceBoard {
    label: RwLock<String>,
}

impl PresenceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current label, empty until the first cycle completes
    pub fn label(&self) -> String {
        match self.label.read() {
            Ok(label) => label.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PresenceSink for PresenceBoard {
    fn set_presence(&self, status_label: &str) {
        let mut label = match self.label.write() {
            Ok(label) => label,
            Err(poisoned) => {
                warn!("Presence lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        if *label != status_label {
            info!("Presence: {}", status_label);
            *label = status_label.to_string();
        }
    }
}
