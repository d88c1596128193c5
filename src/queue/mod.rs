//! Matchmaking queues
//!
//! This module holds the per-queue admission and pop state machine, the
//! game it forms, the waitlist and cooldown tracking, threshold
//! notifications, and the guild and process level owners of queues.

pub mod game;
pub mod instance;
pub mod manager;
pub mod notifications;
pub mod outbox;
pub mod provider;
pub mod registry;
pub mod roster;
pub mod waitlist;

// Re-export commonly used types
pub use game::Game;
pub use instance::{Admission, GuildScope, Queue};
pub use manager::{QueueManager, QueueManagerStats};
pub use outbox::{Effect, Outbox, StorageWrite};
pub use provider::{
    GuildSettings, QueueConfiguration, QueueSettings, SettingsProvider, StaticSettingsProvider,
};
pub use registry::{QueueDefinition, RegistryStats, ServerDefinition, ServerRegistry};
pub use waitlist::CooldownTracker;
