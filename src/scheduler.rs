//! Delayed, cancellable tasks
//!
//! A process-wide scheduler for the engine's timers: delayed game-start
//! announcements and cooldown expiries. Tasks are keyed by guild and task
//! kind, fire at most once, and can be cancelled one by one or per guild.

use crate::error::{QueueError, Result};
use crate::types::{GameId, ServerId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

/// What a scheduled task does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Post the game-starting announcement of a popped game
    Announcement(GameId),
    /// Release the cooldown of a finished game's players
    CooldownExpiry(GameId),
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Announcement(id) => write!(f, "announcement:{}", id),
            TaskKind::CooldownExpiry(id) => write!(f, "cooldown:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub server_id: ServerId,
    pub kind: TaskKind,
}

impl TaskKey {
    pub fn new(server_id: ServerId, kind: TaskKind) -> Self {
        Self { server_id, kind }
    }
}

struct ScheduledTask {
    generation: u64,
    handle: JoinHandle<()>,
}

type TaskMap = Arc<Mutex<HashMap<TaskKey, ScheduledTask>>>;

#[derive(Default)]
pub struct TaskScheduler {
    tasks: TaskMap,
    next_generation: AtomicU64,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `delay`. Scheduling a key that is already
    /// pending replaces the earlier task.
    pub fn schedule<F, Fut>(&self, key: TaskKey, delay: Duration, task: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        let mut pending = self
            .tasks
            .lock()
            .map_err(|_| QueueError::lock("scheduler"))?;

        let handle = tokio::spawn(async move {
            sleep(delay).await;

            // Deregister before running so a late cancel cannot abort a callback midway
            let current = match tasks.lock() {
                Ok(mut pending) => match pending.get(&key) {
                    Some(task) if task.generation == generation => {
                        pending.remove(&key);
                        true
                    }
                    _ => false,
                },
                Err(_) => false,
            };

            if current {
                debug!("Running scheduled task {} for server {}", key.kind, key.server_id);
                task().await;
            }
        });

        if let Some(previous) = pending.insert(key, ScheduledTask { generation, handle }) {
            debug!(
                "Replaced pending task {} for server {}",
                key.kind, key.server_id
            );
            previous.handle.abort();
        }

        debug!(
            "Scheduled task {} for server {} in {:?}",
            key.kind, key.server_id, delay
        );
        Ok(())
    }

    /// Cancel a pending task. Returns false if it already ran or never existed.
    pub fn cancel(&self, key: &TaskKey) -> Result<bool> {
        let mut pending = self
            .tasks
            .lock()
            .map_err(|_| QueueError::lock("scheduler"))?;

        match pending.remove(key) {
            Some(task) => {
                task.handle.abort();
                debug!("Cancelled task {} for server {}", key.kind, key.server_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancel every pending task of a guild
    pub fn cancel_server(&self, server_id: ServerId) -> Result<usize> {
        let mut pending = self
            .tasks
            .lock()
            .map_err(|_| QueueError::lock("scheduler"))?;

        let keys: Vec<TaskKey> = pending
            .keys()
            .filter(|k| k.server_id == server_id)
            .copied()
            .collect();

        for key in &keys {
            if let Some(task) = pending.remove(key) {
                task.handle.abort();
            }
        }

        if !keys.is_empty() {
            info!(
                "Cancelled {} pending tasks for server {}",
                keys.len(),
                server_id
            );
        }
        Ok(keys.len())
    }

    pub fn is_pending(&self, key: &TaskKey) -> Result<bool> {
        let pending = self
            .tasks
            .lock()
            .map_err(|_| QueueError::lock("scheduler"))?;
        Ok(pending.contains_key(key))
    }

    pub fn pending_count(&self) -> Result<usize> {
        let pending = self
            .tasks
            .lock()
            .map_err(|_| QueueError::lock("scheduler"))?;
        Ok(pending.len())
    }

    pub fn pending_for_server(&self, server_id: ServerId) -> Result<usize> {
        let pending = self
            .tasks
            .lock()
            .map_err(|_| QueueError::lock("scheduler"))?;
        Ok(pending.keys().filter(|k| k.server_id == server_id).count())
    }

    /// Abort everything, used at process shutdown
    pub fn shutdown(&self) -> Result<usize> {
        let mut pending = self
            .tasks
            .lock()
            .map_err(|_| QueueError::lock("scheduler"))?;

        let count = pending.len();
        for (_, task) in pending.drain() {
            task.handle.abort();
        }
        Ok(count)
    }
}
