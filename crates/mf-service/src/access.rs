//! Submission access policy.

use mf_core::config::AccessConfig;
use mf_core::{ChatId, UserId};

/// Decides whether a principal may submit work in a chat.
///
/// Bans are stored on the session and checked by the service; this type only
/// looks at configuration.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    owner: Option<UserId>,
    sudo_users: Vec<UserId>,
    authorized_groups: Vec<ChatId>,
    allow_private: bool,
}

impl AccessPolicy {
    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            owner: config.owner_id,
            sudo_users: config.sudo_users.clone(),
            authorized_groups: config.authorized_groups.clone(),
            allow_private: config.allow_private,
        }
    }

    /// Owner or sudo user.
    pub fn is_admin(&self, user: UserId) -> bool {
        self.owner == Some(user) || self.sudo_users.contains(&user)
    }

    pub fn can_submit(&self, user: UserId, chat: ChatId) -> bool {
        if self.is_admin(user) {
            return true;
        }
        if chat.is_group() {
            self.authorized_groups.contains(&chat)
        } else {
            self.allow_private
        }
    }
}
