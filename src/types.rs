//! Common types used throughout the queue engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for a guild (server)
pub type ServerId = u64;

/// Identifier of a queue, unique within its guild
pub type QueueId = u32;

/// Unique identifier for players
pub type PlayerId = u64;

/// Unique identifier for games
pub type GameId = Uuid;

/// Presence state reported by the chat platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presence {
    Available,
    Away,
    Unavailable,
}

impl Presence {
    /// Whether a threshold alert should be delivered to a player in this state
    pub fn accepts_alerts(self) -> bool {
        matches!(self, Presence::Available | Presence::Away)
    }
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Presence::Available => write!(f, "available"),
            Presence::Away => write!(f, "away"),
            Presence::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Accent color of a channel announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnouncementColor {
    Yellow,
    Green,
    Red,
}

/// Message posted to a guild's pickup channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub server_id: ServerId,
    pub title: String,
    pub body: String,
    pub color: AnnouncementColor,
}

/// Lifecycle state of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    Active,
    Finished,
}

/// Point-in-time view of one queue, safe to hand out of the guild lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub server_id: ServerId,
    pub queue_id: QueueId,
    pub name: String,
    pub capacity: usize,
    pub roster: Vec<PlayerId>,
    pub waitlist: Vec<PlayerId>,
    pub active_games: usize,
    pub notifications: BTreeMap<usize, Vec<PlayerId>>,
}

impl QueueStatus {
    /// Number of players currently in the roster
    pub fn player_count(&self) -> usize {
        self.roster.len()
    }
}

/// Summary of a game that popped from a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSummary {
    pub game_id: GameId,
    pub server_id: ServerId,
    pub queue_id: QueueId,
    pub queue_name: String,
    pub players: Vec<PlayerId>,
    pub captains: Option<(PlayerId, PlayerId)>,
    pub state: GameState,
    pub started_at: DateTime<Utc>,
}

/// Persisted state of one queue, replayed at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredQueue {
    /// Roster rows in insertion order
    pub roster: Vec<PlayerId>,
    /// Notification rows as `(threshold, player)`
    pub notifications: Vec<(usize, PlayerId)>,
}
