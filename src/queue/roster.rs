//! Ordered, duplicate-free set of players waiting in one queue

use crate::types::PlayerId;
use std::collections::HashSet;

/// Players currently waiting in a queue, in join order
#[derive(Debug, Clone, Default)]
pub struct Roster {
    order: Vec<PlayerId>,
    members: HashSet<PlayerId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a player. Returns false if the player was already present.
    pub fn push(&mut self, player: PlayerId) -> bool {
        if !self.members.insert(player) {
            return false;
        }
        self.order.push(player);
        true
    }

    /// Remove a player, keeping the order of everyone else
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

    /// Players in join order
    pub fn players(&self) -> &[PlayerId] {
        &self.order
    }

    /// Empty the roster and hand back its players in join order
    pub fn take(&mut self) -> Vec<PlayerId> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }
}
