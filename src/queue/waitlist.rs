//! Waitlist and cooldown tracking
//!
//! Two related sets live here and must not be conflated:
//! - [`Waitlist`]: per-queue players who tried to join while on cooldown
//! - [`CooldownTracker`]: guild-wide players inside the post-game window,
//!   shared by every queue of the guild

use crate::error::{QueueError, Result};
use crate::types::{GameId, PlayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::debug;

/// Players deferred from one queue because they just finished a game
#[derive(Debug, Clone, Default)]
pub struct Waitlist {
    order: Vec<PlayerId>,
    members: HashSet<PlayerId>,
}

impl Waitlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player. Returns false if the player was already waiting.
    pub fn insert(&mut self, player: PlayerId) -> bool {
        if !self.members.insert(player) {
            return false;
        }
        self.order.push(player);
        true
    }

    pub fn remove(&mut self, player: PlayerId) -> bool {
        if !self.members.remove(&player) {
            return false;
        }
        self.order.retain(|p| *p != player);
        true
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.order
    }
}

/// A player's pending cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub game_id: GameId,
    pub expires_at: DateTime<Utc>,
}

/// Guild-wide set of players who just finished a game
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: RwLock<HashMap<PlayerId, CooldownEntry>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the cooldown of every player of a finished game
    pub fn start(
        &self,
        game_id: GameId,
        players: &[PlayerId],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| QueueError::lock("cooldown"))?;

        for player in players {
            entries.insert(
                *player,
                CooldownEntry {
                    game_id,
                    expires_at,
                },
            );
        }

        debug!(
            "Cooldown started for {} players of game {} until {}",
            players.len(),
            game_id,
            expires_at
        );
        Ok(())
    }

    /// End the cooldown that `game_id` started. Entries that belong to a
    /// different game are left alone. Returns the players that were released.
    pub fn release(&self, game_id: GameId, players: &[PlayerId]) -> Result<Vec<PlayerId>> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| QueueError::lock("cooldown"))?;

        let mut released = Vec::with_capacity(players.len());
        for player in players {
            if entries.get(player).is_some_and(|e| e.game_id == game_id) {
                entries.remove(player);
                released.push(*player);
            }
        }
        Ok(released)
    }

    /// Whether the player is still inside a cooldown window
    pub fn contains(&self, player: PlayerId) -> Result<bool> {
        let entries = self
            .entries
            .read()
            .map_err(|_| QueueError::lock("cooldown"))?;
        Ok(entries.contains_key(&player))
    }

    pub fn entry(&self, player: PlayerId) -> Result<Option<CooldownEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| QueueError::lock("cooldown"))?;
        Ok(entries.get(&player).copied())
    }

    pub fn len(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| QueueError::lock("cooldown"))?;
        Ok(entries.len())
    }

    /// Drop every entry, used when the guild is torn down
    pub fn clear(&self) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| QueueError::lock("cooldown"))?;
        entries.clear();
        Ok(())
    }
}
