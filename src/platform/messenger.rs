//! Presence and messaging collaborator

use crate::error::Result;
use crate::types::{Announcement, PlayerId, Presence};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// Outbound messages and presence lookups on the chat platform
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Private message to a single player
    async fn send_direct_notice(&self, player: PlayerId, text: &str) -> Result<()>;

    /// Post an announcement to the guild's pickup channel
    async fn announce(&self, announcement: &Announcement) -> Result<()>;

    /// Current presence of a player
    async fn presence(&self, player: PlayerId) -> Result<Presence>;
}

/// Messenger that only writes to the log, for running without a chat platform
#[derive(Debug, Default)]
pub struct LoggingMessenger;

impl LoggingMessenger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Messenger for LoggingMessenger {
    async fn send_direct_notice(&self, player: PlayerId, text: &str) -> Result<()> {
        info!("[notice -> {}] {}", player, text);
        Ok(())
    }

    async fn announce(&self, announcement: &Announcement) -> Result<()> {
        info!(
            "[announce server {} {:?}] {} | {}",
            announcement.server_id,
            announcement.color,
            announcement.title,
            announcement.body.replace('\n', " | ")
        );
        Ok(())
    }

    async fn presence(&self, _player: PlayerId) -> Result<Presence> {
        Ok(Presence::Available)
    }
}

/// Mock messenger for testing
#[derive(Debug, Default)]
pub struct MockMessenger {
    notices: Mutex<Vec<(PlayerId, String)>>,
    announcements: Mutex<Vec<Announcement>>,
    presence: Mutex<HashMap<PlayerId, Presence>>,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the presence reported for a player. Unknown players are available.
    pub fn set_presence(&self, player: PlayerId, presence: Presence) {
        if let Ok(mut map) = self.presence.lock() {
            map.insert(player, presence);
        }
    }

    /// Direct notices sent so far (for testing)
    pub fn notices(&self) -> Vec<(PlayerId, String)> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    /// Notices received by one player
    pub fn notices_for(&self, player: PlayerId) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, text)| text)
            .collect()
    }

    /// Announcements posted so far (for testing)
    pub fn announcements(&self) -> Vec<Announcement> {
        self.announcements
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.clear();
        }
        if let Ok(mut announcements) = self.announcements.lock() {
            announcements.clear();
        }
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send_direct_notice(&self, player: PlayerId, text: &str) -> Result<()> {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((player, text.to_string()));
        }
        Ok(())
    }

    async fn announce(&self, announcement: &Announcement) -> Result<()> {
        if let Ok(mut announcements) = self.announcements.lock() {
            announcements.push(announcement.clone());
        }
        Ok(())
    }

    async fn presence(&self, player: PlayerId) -> Result<Presence> {
        Ok(self
            .presence
            .lock()
            .ok()
            .and_then(|map| map.get(&player).copied())
            .unwrap_or(Presence::Available))
    }
}
