//! Error types for the pickup queue engine
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

use crate::types::{PlayerId, QueueId, ServerId};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific queue engine scenarios
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Server not found: {server_id}")]
    ServerNotFound { server_id: ServerId },

    #[error("Queue not found: {queue_id} on server {server_id}")]
    QueueNotFound { server_id: ServerId, queue_id: QueueId },

    #[error("Player {player_id} is already in a game")]
    PlayerInGame { player_id: PlayerId },

    #[error("Invalid queue capacity: {reason}")]
    InvalidCapacity { reason: String },

    #[error("Invalid notification threshold {threshold}: {reason}")]
    InvalidThreshold { threshold: usize, reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Storage write failed: {message}")]
    StorageFailure { message: String },

    #[error("Message delivery failed: {message}")]
    MessagingFailure { message: String },

    #[error("Internal engine error: {message}")]
    InternalError { message: String },
}

impl QueueError {
    /// Error for a poisoned or otherwise unavailable lock
    pub(crate) fn lock(name: &str) -> Self {
        QueueError::InternalError {
            message: format!("Failed to acquire {} lock", name),
        }
    }
}
