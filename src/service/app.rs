//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the queue
//! registry to its collaborators and runs the background maintenance tasks.

use crate::config::AppConfig;
use crate::metrics::MetricsCollector;
use crate::platform::dispatch::Dispatcher;
use crate::platform::messenger::{LoggingMessenger, Messenger};
use crate::platform::storage::{InMemoryQueueStorage, QueueStorage};
use crate::queue::provider::{SettingsProvider, StaticSettingsProvider};
use crate::queue::registry::{RegistryStats, ServerRegistry};
use crate::scheduler::TaskScheduler;
use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Every guild and its queues
    registry: Arc<ServerRegistry>,

    /// Shared delayed-task runner
    scheduler: Arc<TaskScheduler>,

    /// Metrics collector shared with the health server
    metrics: Arc<MetricsCollector>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with in-process collaborators
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_collaborators(
            config,
            Arc::new(InMemoryQueueStorage::new()),
            Arc::new(LoggingMessenger::new()),
        )
        .await
    }

    /// Initialize the application around the given storage and messenger
    pub async fn with_collaborators(
        config: AppConfig,
        storage: Arc<dyn QueueStorage>,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing pickup-queue service");
        info!(
            "Configuration: service={}, finish_cooldown={}s, announce_delay={}s, servers={}",
            config.service.name,
            config.matchmaking.finish_cooldown_seconds,
            config.matchmaking.announce_delay_seconds,
            config.servers.len()
        );

        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let scheduler = Arc::new(TaskScheduler::new());
        let dispatcher = Arc::new(Dispatcher::new(
            storage,
            messenger,
            scheduler.clone(),
            metrics.clone(),
        ));
        let settings: Arc<dyn SettingsProvider> =
            Arc::new(StaticSettingsProvider::new(config.guild_settings()));
        let registry = Arc::new(ServerRegistry::new(settings, dispatcher));

        Ok(Self {
            config,
            registry,
            scheduler,
            metrics,
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Restore configured queues and start background tasks
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting pickup-queue service");

        let restored = self
            .registry
            .restore(&self.config.servers)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to restore configured queues: {}", e),
            })?;
        info!(
            "Restored {} queues across {} configured servers",
            restored,
            self.config.servers.len()
        );

        *self.is_running.write().await = true;
        self.metrics.update_health_status(2);

        self.start_background_tasks().await;

        info!("✅ pickup-queue service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of pickup-queue service");

        *self.is_running.write().await = false;
        self.metrics.update_health_status(0);

        self.stop_background_tasks().await;

        let final_stats = self
            .registry
            .stats()
            .await
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            })?;

        self.registry
            .shutdown()
            .await
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to tear down servers: {}", e),
            })?;

        match self.scheduler.shutdown() {
            Ok(cancelled) if cancelled > 0 => {
                info!("Cancelled {} leftover scheduled tasks", cancelled)
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to cancel scheduled tasks: {}", e),
        }

        info!("Final service statistics: {:?}", final_stats);
        info!("✅ pickup-queue service shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn registry(&self) -> Arc<ServerRegistry> {
        self.registry.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn scheduler(&self) -> Arc<TaskScheduler> {
        self.scheduler.clone()
    }

    /// Aggregate statistics over every guild
    pub async fn stats(&self) -> Result<RegistryStats> {
        self.registry.stats().await
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) {
        info!("Starting background maintenance tasks...");

        // Service health metrics task
        let health_metrics_task = {
            let metrics = self.metrics.clone();
            let registry = self.registry.clone();
            let scheduler = self.scheduler.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics.service().uptime_seconds.set(uptime_seconds);

                    match scheduler.pending_count() {
                        Ok(pending) => metrics.update_scheduled_tasks(pending),
                        Err(e) => warn!("Failed to count scheduled tasks: {}", e),
                    }

                    let registry_healthy = match registry.stats().await {
                        Ok(stats) => {
                            debug!(
                                "Updated service metrics - uptime: {}s, servers: {}, queues: {}, waiting: {}, games: {}",
                                uptime_seconds,
                                stats.servers,
                                stats.queues,
                                stats.players_waiting,
                                stats.active_games
                            );
                            true
                        }
                        Err(e) => {
                            warn!("Failed to get registry stats for metrics update: {}", e);
                            false
                        }
                    };

                    metrics.update_component_health("registry", registry_healthy);
                    metrics.update_component_health("scheduler", true);
                    metrics.update_health_status(if registry_healthy { 2 } else { 1 });
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.lock().await.push(health_metrics_task);
        info!("1 background maintenance task started successfully");
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
