//! Queue and guild settings
//!
//! This module defines the configuration of a single queue, the guild-level
//! timing settings, and the provider trait the engine reads them through.

use crate::error::{QueueError, Result};
use crate::types::ServerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Per-queue switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Pick two random captains whenever the queue pops
    #[serde(default)]
    pub randomize_captains: bool,
}

impl QueueSettings {
    pub fn randomize_captains(&self) -> bool {
        self.randomize_captains
    }
}

/// Configuration a queue is created from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfiguration {
    /// Display name of the queue
    pub name: String,
    /// Number of players that makes the queue pop
    pub capacity: usize,
    #[serde(default)]
    pub settings: QueueSettings,
}

impl QueueConfiguration {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            settings: QueueSettings::default(),
        }
    }

    /// Enable random captain selection
    pub fn with_captains(mut self) -> Self {
        self.settings.randomize_captains = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(QueueError::ConfigurationError {
                message: "Queue name cannot be empty".to_string(),
            }
            .into());
        }

        validate_capacity(self.capacity, &self.settings)
    }
}

/// Capacity rules shared by creation and later capacity changes
pub fn validate_capacity(capacity: usize, settings: &QueueSettings) -> Result<()> {
    if capacity == 0 {
        return Err(QueueError::InvalidCapacity {
            reason: "Queue capacity must be greater than 0".to_string(),
        }
        .into());
    }

    if settings.randomize_captains && capacity < 2 {
        return Err(QueueError::ConfigurationError {
            message: format!(
                "Randomized captains need a capacity of at least 2, got {}",
                capacity
            ),
        }
        .into());
    }

    Ok(())
}

/// Longest accepted finish cooldown, one week
pub const MAX_FINISH_COOLDOWN_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted announcement delay, one hour
pub const MAX_ANNOUNCE_DELAY_SECONDS: u64 = 60 * 60;

/// Guild-wide timing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    /// How long finished players are kept out of direct admission
    pub finish_cooldown_seconds: u64,
    /// Delay between a pop and its channel announcement
    pub announce_delay_seconds: u64,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            finish_cooldown_seconds: 60,
            announce_delay_seconds: 2,
        }
    }
}

impl GuildSettings {
    pub fn finish_cooldown(&self) -> Duration {
        Duration::from_secs(self.finish_cooldown_seconds)
    }

    pub fn announce_delay(&self) -> Duration {
        Duration::from_secs(self.announce_delay_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.finish_cooldown_seconds > MAX_FINISH_COOLDOWN_SECONDS {
            return Err(QueueError::ConfigurationError {
                message: format!(
                    "Finish cooldown of {}s exceeds the {}s limit",
                    self.finish_cooldown_seconds, MAX_FINISH_COOLDOWN_SECONDS
                ),
            }
            .into());
        }

        if self.announce_delay_seconds > MAX_ANNOUNCE_DELAY_SECONDS {
            return Err(QueueError::ConfigurationError {
                message: format!(
                    "Announce delay of {}s exceeds the {}s limit",
                    self.announce_delay_seconds, MAX_ANNOUNCE_DELAY_SECONDS
                ),
            }
            .into());
        }

        Ok(())
    }
}

/// Source of guild settings
pub trait SettingsProvider: Send + Sync {
    /// Settings for a guild, falling back to defaults
    fn guild_settings(&self, server_id: ServerId) -> GuildSettings;

    /// Replace the settings of one guild
    fn update_guild_settings(&self, server_id: ServerId, settings: GuildSettings) -> Result<()>;
}

/// Settings held in memory, seeded from the application config
#[derive(Debug, Default)]
pub struct StaticSettingsProvider {
    defaults: GuildSettings,
    overrides: RwLock<HashMap<ServerId, GuildSettings>>,
}

impl StaticSettingsProvider {
    pub fn new(defaults: GuildSettings) -> Self {
        Self {
            defaults,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> &GuildSettings {
        &self.defaults
    }
}

impl SettingsProvider for StaticSettingsProvider {
    fn guild_settings(&self, server_id: ServerId) -> GuildSettings {
        self.overrides
            .read()
            .ok()
            .and_then(|o| o.get(&server_id).cloned())
            .unwrap_or_else(|| self.defaults.clone())
    }

    fn update_guild_settings(&self, server_id: ServerId, settings: GuildSettings) -> Result<()> {
        settings.validate()?;
        let mut overrides = self
            .overrides
            .write()
            .map_err(|_| QueueError::lock("settings"))?;
        overrides.insert(server_id, settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_configuration_validation() {
        assert!(QueueConfiguration::new("5v5", 10).validate().is_ok());
        assert!(QueueConfiguration::new("", 10).validate().is_err());
        assert!(QueueConfiguration::new("zero", 0).validate().is_err());
        assert!(QueueConfiguration::new("solo", 1).validate().is_ok());
    }

    #[test]
    fn test_captains_need_capacity_two() {
        let err = QueueConfiguration::new("solo", 1)
            .with_captains()
            .validate()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QueueError>(),
            Some(QueueError::ConfigurationError { .. })
        ));
        assert!(QueueConfiguration::new("duo", 2)
            .with_captains()
            .validate()
            .is_ok());
    }

    #[test]
    fn test_guild_settings_durations() {
        let settings = GuildSettings::default();
        assert_eq!(settings.finish_cooldown(), Duration::from_secs(60));
        assert_eq!(settings.announce_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_static_provider_overrides() {
        let provider = StaticSettingsProvider::new(GuildSettings::default());
        assert_eq!(provider.guild_settings(1), GuildSettings::default());

        let custom = GuildSettings {
            finish_cooldown_seconds: 300,
            announce_delay_seconds: 0,
        };
        provider.update_guild_settings(1, custom.clone()).unwrap();
        assert_eq!(provider.guild_settings(1), custom);
        assert_eq!(provider.guild_settings(2), GuildSettings::default());
    }

    #[test]
    fn test_unbounded_timings_are_rejected() {
        let provider = StaticSettingsProvider::new(GuildSettings::default());

        let endless_cooldown = GuildSettings {
            finish_cooldown_seconds: 10_000_000_000_000,
            announce_delay_seconds: 2,
        };
        let err = provider
            .update_guild_settings(1, endless_cooldown)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QueueError>(),
            Some(QueueError::ConfigurationError { .. })
        ));

        let slow_announce = GuildSettings {
            finish_cooldown_seconds: 60,
            announce_delay_seconds: MAX_ANNOUNCE_DELAY_SECONDS + 1,
        };
        assert!(provider.update_guild_settings(1, slow_announce).is_err());

        // Rejected updates leave the previous settings in place
        assert_eq!(provider.guild_settings(1), GuildSettings::default());

        let longest = GuildSettings {
            finish_cooldown_seconds: MAX_FINISH_COOLDOWN_SECONDS,
            announce_delay_seconds: MAX_ANNOUNCE_DELAY_SECONDS,
        };
        provider.update_guild_settings(1, longest.clone()).unwrap();
        assert_eq!(provider.guild_settings(1), longest);
    }
}
