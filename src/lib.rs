//! Pickup Queue - matchmaking engine for pickup games on community chat servers
//!
//! This crate keeps per-server capacity queues, forms a game with optional
//! random captains when a queue fills, redirects recently finished players to
//! a waitlist until their cooldown expires, and alerts subscribers when a
//! queue reaches their threshold.

pub mod config;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{QueueError, Result};
pub use types::*;

// Re-export key components
pub use platform::{Messenger, QueueStorage};
pub use queue::{Admission, QueueManager, ServerRegistry, SettingsProvider, StaticSettingsProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
