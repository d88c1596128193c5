//! Process-wide registry of guild queue managers

use crate::error::{QueueError, Result};
use crate::metrics::MetricsCollector;
use crate::platform::dispatch::Dispatcher;
use crate::queue::manager::QueueManager;
use crate::queue::provider::{QueueConfiguration, SettingsProvider};
use crate::types::{QueueId, ServerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

/// A queue to recreate at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDefinition {
    pub id: QueueId,
    #[serde(flatten)]
    pub config: QueueConfiguration,
}

/// A guild and the queues it had configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDefinition {
    pub id: ServerId,
    #[serde(default)]
    pub queues: Vec<QueueDefinition>,
}

/// Totals over every registered guild
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub servers: usize,
    pub queues: usize,
    pub players_waiting: usize,
    pub active_games: usize,
    pub players_on_cooldown: usize,
    pub games_started: u64,
    pub games_finished: u64,
}

/// Owns the `QueueManager` of every guild
pub struct ServerRegistry {
    servers: RwLock<HashMap<ServerId, Arc<QueueManager>>>,
    settings: Arc<dyn SettingsProvider>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<MetricsCollector>,
}

impl ServerRegistry {
    pub fn new(settings: Arc<dyn SettingsProvider>, dispatcher: Arc<Dispatcher>) -> Self {
        let metrics = dispatcher.metrics();
        Self {
            servers: RwLock::new(HashMap::new()),
            settings,
            dispatcher,
            metrics,
        }
    }

    /// Manager of a guild, created on first use
    pub fn add_server(&self, server_id: ServerId) -> Result<Arc<QueueManager>> {
        let mut servers = self
            .servers
            .write()
            .map_err(|_| QueueError::lock("servers"))?;

        if let Some(manager) = servers.get(&server_id) {
            return Ok(Arc::clone(manager));
        }

        let manager = QueueManager::new(
            server_id,
            Arc::clone(&self.settings),
            Arc::clone(&self.dispatcher),
        );
        servers.insert(server_id, Arc::clone(&manager));
        self.metrics.update_active_servers(servers.len());

        info!("Registered server {}", server_id);
        Ok(manager)
    }

    pub fn get(&self, server_id: ServerId) -> Result<Arc<QueueManager>> {
        let servers = self
            .servers
            .read()
            .map_err(|_| QueueError::lock("servers"))?;

        servers
            .get(&server_id)
            .cloned()
            .ok_or_else(|| QueueError::ServerNotFound { server_id }.into())
    }

    pub fn server_ids(&self) -> Result<Vec<ServerId>> {
        let servers = self
            .servers
            .read()
            .map_err(|_| QueueError::lock("servers"))?;
        let mut ids: Vec<ServerId> = servers.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Tear a guild down and forget it. Returns false if it was unknown.
    pub async fn remove_server(&self, server_id: ServerId) -> Result<bool> {
        let manager = {
            let mut servers = self
                .servers
                .write()
                .map_err(|_| QueueError::lock("servers"))?;
            let manager = servers.remove(&server_id);
            self.metrics.update_active_servers(servers.len());
            manager
        };

        match manager {
            Some(manager) => {
                manager.shutdown().await?;
                info!("Removed server {}", server_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Recreate configured guilds and queues, reloading their rows from
    /// storage. A queue that fails to restore is logged and skipped.
    pub async fn restore(&self, servers: &[ServerDefinition]) -> Result<usize> {
        let mut restored = 0;

        for server in servers {
            let manager = self.add_server(server.id)?;
            for queue in &server.queues {
                match manager.restore_queue(queue.id, queue.config.clone()).await {
                    Ok(status) => {
                        restored += 1;
                        info!(
                            "Restored queue '{}' ({}) on server {} with {} players",
                            status.name,
                            queue.id,
                            server.id,
                            status.player_count()
                        );
                    }
                    Err(e) => error!(
                        "Failed to restore queue {} on server {}: {}",
                        queue.id, server.id, e
                    ),
                }
            }
        }

        Ok(restored)
    }

    /// Aggregate statistics over all guilds
    pub async fn stats(&self) -> Result<RegistryStats> {
        let managers: Vec<Arc<QueueManager>> = {
            let servers = self
                .servers
                .read()
                .map_err(|_| QueueError::lock("servers"))?;
            servers.values().cloned().collect()
        };

        let mut totals = RegistryStats {
            servers: managers.len(),
            ..RegistryStats::default()
        };
        for manager in managers {
            let stats = manager.stats().await?;
            totals.queues += stats.queues;
            totals.players_waiting += stats.players_waiting;
            totals.active_games += stats.active_games;
            totals.players_on_cooldown += stats.players_on_cooldown;
            totals.games_started += stats.games_started;
            totals.games_finished += stats.games_finished;
        }
        Ok(totals)
    }

    /// Tear every guild down, used at process shutdown
    pub async fn shutdown(&self) -> Result<()> {
        let managers: Vec<Arc<QueueManager>> = {
            let mut servers = self
                .servers
                .write()
                .map_err(|_| QueueError::lock("servers"))?;
            servers.drain().map(|(_, m)| m).collect()
        };

        for manager in managers {
            if let Err(e) = manager.shutdown().await {
                warn!(
                    "Failed to tear down server {}: {}",
                    manager.server_id(),
                    e
                );
            }
        }
        self.metrics.update_active_servers(0);
        Ok(())
    }
}
