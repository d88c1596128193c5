//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! pickup-queue service, including environment variable and TOML loading
//! and validation.

use crate::queue::provider::GuildSettings;
use crate::queue::registry::ServerDefinition;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub matchmaking: MatchmakingSettings,
    /// Guilds and queues recreated at startup
    #[serde(default)]
    pub servers: Vec<ServerDefinition>,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// How long finished players are redirected to waitlists
    pub finish_cooldown_seconds: u64,
    /// Delay before the game-starting announcement
    pub announce_delay_seconds: u64,
    /// Capacity used by tooling when a queue is created without one
    pub default_queue_capacity: usize,
    /// Whether tooling-created queues pick captains
    pub randomize_captains: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "pickup-queue".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        let guild = GuildSettings::default();
        Self {
            finish_cooldown_seconds: guild.finish_cooldown_seconds,
            announce_delay_seconds: guild.announce_delay_seconds,
            default_queue_capacity: 10,
            randomize_captains: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still override it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Matchmaking settings
        if let Ok(cooldown) = env::var("QUEUE_FINISH_COOLDOWN_SECONDS") {
            self.matchmaking.finish_cooldown_seconds = cooldown.parse().map_err(|_| {
                anyhow!("Invalid QUEUE_FINISH_COOLDOWN_SECONDS value: {}", cooldown)
            })?;
        }
        if let Ok(delay) = env::var("GAME_ANNOUNCE_DELAY_SECONDS") {
            self.matchmaking.announce_delay_seconds = delay
                .parse()
                .map_err(|_| anyhow!("Invalid GAME_ANNOUNCE_DELAY_SECONDS value: {}", delay))?;
        }
        if let Ok(capacity) = env::var("DEFAULT_QUEUE_CAPACITY") {
            self.matchmaking.default_queue_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_QUEUE_CAPACITY value: {}", capacity))?;
        }
        if let Ok(captains) = env::var("RANDOMIZE_CAPTAINS") {
            self.matchmaking.randomize_captains = captains
                .parse()
                .map_err(|_| anyhow!("Invalid RANDOMIZE_CAPTAINS value: {}", captains))?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Guild defaults handed to the settings provider
    pub fn guild_settings(&self) -> GuildSettings {
        GuildSettings {
            finish_cooldown_seconds: self.matchmaking.finish_cooldown_seconds,
            announce_delay_seconds: self.matchmaking.announce_delay_seconds,
        }
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate matchmaking settings
    if config.matchmaking.default_queue_capacity == 0 {
        return Err(anyhow!("Default queue capacity must be greater than 0"));
    }
    if config.matchmaking.randomize_captains && config.matchmaking.default_queue_capacity < 2 {
        return Err(anyhow!(
            "Randomized captains need a default queue capacity of at least 2"
        ));
    }
    config
        .guild_settings()
        .validate()
        .context("Invalid matchmaking timings")?;

    // Validate startup queues
    let mut server_ids = HashSet::new();
    for server in &config.servers {
        if !server_ids.insert(server.id) {
            return Err(anyhow!("Server {} is configured twice", server.id));
        }

        let mut queue_ids = HashSet::new();
        for queue in &server.queues {
            if !queue_ids.insert(queue.id) {
                return Err(anyhow!(
                    "Queue {} is configured twice on server {}",
                    queue.id,
                    server.id
                ));
            }
            queue.config.validate().with_context(|| {
                format!("Invalid queue {} on server {}", queue.id, server.id)
            })?;
        }
    }

    Ok(())
}
