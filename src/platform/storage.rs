//! Storage collaborator
//!
//! The engine writes through to a durable mapping of roster and
//! notification rows and reads it back once at startup.

use crate::error::{QueueError, Result};
use crate::queue::outbox::StorageWrite;
use crate::types::{PlayerId, QueueId, ServerId, StoredQueue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Durable queue rows
#[async_trait]
pub trait QueueStorage: Send + Sync {
    async fn insert_player_in_queue(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    ) -> Result<()>;

    async fn delete_player_in_queue(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    ) -> Result<()>;

    /// Delete every roster row of a queue
    async fn delete_players_in_queue_from_queue(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
    ) -> Result<()>;

    async fn insert_queue_notification(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
        threshold: usize,
    ) -> Result<()>;

    /// Delete every notification row of a player in a queue
    async fn delete_queue_notification(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    ) -> Result<()>;

    /// Rows of one queue, used to restore it at startup
    async fn load_queue(&self, server_id: ServerId, queue_id: QueueId) -> Result<StoredQueue>;
}

/// Apply one recorded write to a storage backend
pub async fn apply_write(storage: &dyn QueueStorage, write: &StorageWrite) -> Result<()> {
    match *write {
        StorageWrite::InsertPlayer {
            server_id,
            queue_id,
            player_id,
        } => {
            storage
                .insert_player_in_queue(server_id, queue_id, player_id)
                .await
        }
        StorageWrite::DeletePlayer {
            server_id,
            queue_id,
            player_id,
        } => {
            storage
                .delete_player_in_queue(server_id, queue_id, player_id)
                .await
        }
        StorageWrite::DeleteQueueRoster {
            server_id,
            queue_id,
        } => {
            storage
                .delete_players_in_queue_from_queue(server_id, queue_id)
                .await
        }
        StorageWrite::InsertNotification {
            server_id,
            queue_id,
            player_id,
            threshold,
        } => {
            storage
                .insert_queue_notification(server_id, queue_id, player_id, threshold)
                .await
        }
        StorageWrite::DeleteNotification {
            server_id,
            queue_id,
            player_id,
        } => {
            storage
                .delete_queue_notification(server_id, queue_id, player_id)
                .await
        }
    }
}

/// Storage kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryQueueStorage {
    queues: RwLock<HashMap<(ServerId, QueueId), StoredQueue>>,
}

impl InMemoryQueueStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the rows of one queue
    pub fn with_queue(self, server_id: ServerId, queue_id: QueueId, stored: StoredQueue) -> Self {
        if let Ok(mut queues) = self.queues.write() {
            queues.insert((server_id, queue_id), stored);
        }
        self
    }

    /// Current rows of one queue
    pub fn snapshot(&self, server_id: ServerId, queue_id: QueueId) -> Result<StoredQueue> {
        let queues = self
            .queues
            .read()
            .map_err(|_| QueueError::lock("storage"))?;
        Ok(queues
            .get(&(server_id, queue_id))
            .cloned()
            .unwrap_or_default())
    }

    fn update<F>(&self, server_id: ServerId, queue_id: QueueId, f: F) -> Result<()>
    where
        F: FnOnce(&mut StoredQueue),
    {
        let mut queues = self
            .queues
            .write()
            .map_err(|_| QueueError::lock("storage"))?;
        f(queues.entry((server_id, queue_id)).or_default());
        Ok(())
    }
}

#[async_trait]
impl QueueStorage for InMemoryQueueStorage {
    async fn insert_player_in_queue(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    ) -> Result<()> {
        self.update(server_id, queue_id, |q| {
            if !q.roster.contains(&player_id) {
                q.roster.push(player_id);
            }
        })
    }

    async fn delete_player_in_queue(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    ) -> Result<()> {
        self.update(server_id, queue_id, |q| q.roster.retain(|p| *p != player_id))
    }

    async fn delete_players_in_queue_from_queue(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
    ) -> Result<()> {
        self.update(server_id, queue_id, |q| q.roster.clear())
    }

    async fn insert_queue_notification(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
        threshold: usize,
    ) -> Result<()> {
        self.update(server_id, queue_id, |q| {
            if !q.notifications.contains(&(threshold, player_id)) {
                q.notifications.push((threshold, player_id));
            }
        })
    }

    async fn delete_queue_notification(
        &self,
        server_id: ServerId,
        queue_id: QueueId,
        player_id: PlayerId,
    ) -> Result<()> {
        self.update(server_id, queue_id, |q| {
            q.notifications.retain(|(_, p)| *p != player_id)
        })
    }

    async fn load_queue(&self, server_id: ServerId, queue_id: QueueId) -> Result<StoredQueue> {
        let stored = self.snapshot(server_id, queue_id)?;
        debug!(
            "Loaded {} roster rows and {} notification rows for queue {} on server {}",
            stored.roster.len(),
            stored.notifications.len(),
            queue_id,
            server_id
        );
        Ok(stored)
    }
}
