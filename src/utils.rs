//! Utility functions for the queue engine

use crate::types::PlayerId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique game ID
pub fn generate_game_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Render a player as a platform mention
pub fn mention(player: PlayerId) -> String {
    format!("<@{}>", player)
}

/// Render a list of players as comma separated mentions
pub fn mention_list(players: &[PlayerId]) -> String {
    players
        .iter()
        .map(|p| mention(*p))
        .collect::<Vec<_>>()
        .join(", ")
}
