//! Notification target records

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One channel that receives outage notices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTarget {
    pub channel_id: u64,
    /// Guild the channel belongs to; legacy registrations may lack it
    pub guild_id: Option<u64>,
    /// Roles mentioned on every notice, in registration order
    pub role_ids: Vec<u64>,
    /// Users paged on degradations only
    pub user_ids: BTreeSet<u64>,
}

impl NotificationTarget {
    /// Target without any mentions
    pub fn channel(channel_id: u64) -> Self {
        Self {
            channel_id,
            guild_id: None,
            role_ids: Vec::new(),
            user_ids: BTreeSet::new(),
        }
    }

    pub fn with_guild(mut self, guild_id: u64) -> Self {
        self.guild_id = Some(guild_id);
        self
    }

    /// Add a role mention, keeping order and skipping duplicates
    pub fn with_role(mut self, role_id: u64) -> Self {
        if !self.role_ids.contains(&role_id) {
            self.role_ids.push(role_id);
        }
        self
    }

    pub fn with_user(mut self, user_id: u64) -> Self {
        self.user_ids.insert(user_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_keep_order_without_duplicates() {
        let target = NotificationTarget::channel(1)
            .with_role(30)
            .with_role(10)
            .with_role(30)
            .with_user(5)
            .with_user(5);

        assert_eq!(target.role_ids, vec![30, 10]);
        assert_eq!(target.user_ids.len(), 1);
    }
}
