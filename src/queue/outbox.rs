//! Side effects produced by queue transitions
//!
//! Queue operations run under the guild lock and never touch the platform
//! directly. They record what should happen in an [`Outbox`], which the
//! dispatcher drains once the lock has been released.

use crate::types::{Announcement, GameId, PlayerId, QueueId, ServerId};

/// Write-through call to the storage collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageWrite {
    InsertPlayer {
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    },
    DeletePlayer {
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    },
    /// Drop every roster row of a queue
    DeleteQueueRoster { server_id: ServerId, queue_id: QueueId },
    InsertNotification {
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
        threshold: usize,
    },
    DeleteNotification {
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    },
}

impl StorageWrite {
    /// Operation name used in logs and metrics
    pub fn operation(&self) -> &'static str {
        match self {
            StorageWrite::InsertPlayer { .. } => "insert_player",
            StorageWrite::DeletePlayer { .. } => "delete_player",
            StorageWrite::DeleteQueueRoster { .. } => "delete_roster",
            StorageWrite::InsertNotification { .. } => "insert_notification",
            StorageWrite::DeleteNotification { .. } => "delete_notification",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Persist(StorageWrite),
    /// Private message to one player
    DirectNotice { player: PlayerId, text: String },
    /// Threshold alert, delivered only to players whose presence accepts alerts
    ThresholdAlert {
        queue_id: QueueId,
        players: Vec<PlayerId>,
        text: String,
    },
    /// Channel announcement for a popped game, posted after the guild's delay
    Announce {
        game_id: GameId,
        announcement: Announcement,
    },
}

#[derive(Debug, Default)]
pub struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persist(&mut self, write: StorageWrite) {
        self.effects.push(Effect::Persist(write));
    }

    pub fn notice(&mut self, player: PlayerId, text: impl Into<String>) {
        self.effects.push(Effect::DirectNotice {
            player,
            text: text.into(),
        });
    }

    pub fn alert(&mut self, queue_id: QueueId, players: Vec<PlayerId>, text: impl Into<String>) {
        self.effects.push(Effect::ThresholdAlert {
            queue_id,
            players,
            text: text.into(),
        });
    }

    pub fn announce(&mut self, game_id: GameId, announcement: Announcement) {
        self.effects.push(Effect::Announce {
            game_id,
            announcement,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }

    /// Storage writes recorded so far, in order
    pub fn writes(&self) -> impl Iterator<Item = &StorageWrite> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Persist(w) => Some(w),
            _ => None,
        })
    }

    /// Players that will receive a direct notice
    pub fn notice_recipients(&self) -> Vec<PlayerId> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::DirectNotice { player, .. } => Some(*player),
                _ => None,
            })
            .collect()
    }
}
