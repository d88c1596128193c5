//! Threshold notification registry
//!
//! Pure mapping from a roster size to the players who asked to be alerted
//! when a queue reaches it. Delivery is decided by the owning queue.

use crate::types::PlayerId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct NotificationRegistry {
    thresholds: BTreeMap<usize, Vec<PlayerId>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player for a threshold. Returns false if already registered.
    pub fn register(&mut self, threshold: usize, player: PlayerId) -> bool {
        let players = self.thresholds.entry(threshold).or_default();
        if players.contains(&player) {
            return false;
        }
        players.push(player);
        true
    }

    /// Remove a player from every threshold. Returns the thresholds it was removed from.
    pub fn unregister(&mut self, player: PlayerId) -> Vec<usize> {
        let mut removed = Vec::new();
        for (threshold, players) in self.thresholds.iter_mut() {
            let before = players.len();
            players.retain(|p| *p != player);
            if players.len() != before {
                removed.push(*threshold);
            }
        }
        self.thresholds.retain(|_, players| !players.is_empty());
        removed
    }

    /// Players registered for exactly this roster size
    pub fn subscribers(&self, threshold: usize) -> &[PlayerId] {
        self.thresholds
            .get(&threshold)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_registered(&self, threshold: usize, player: PlayerId) -> bool {
        self.subscribers(threshold).contains(&player)
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Copy of the whole mapping, ordered by threshold
    pub fn snapshot(&self) -> BTreeMap<usize, Vec<PlayerId>> {
        self.thresholds.clone()
    }
}
