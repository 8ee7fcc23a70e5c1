// Configuration management module
// Handles loading, saving, and validating configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "music_presence.conf";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub player: PlayerConfig,

    #[serde(default)]
    pub presence: PresenceConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Poll loop cadence, all values in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Normal cycle and error backoff
    pub short_interval: u64,

    /// Backoff while the player or the presence host is not running
    pub long_interval: u64,

    /// How often expired cache entries are purged
    pub sweep_interval: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            short_interval: 5,
            long_interval: 60,
            sweep_interval: 60,
        }
    }
}

impl PollConfig {
    pub fn short(&self) -> Duration {
        Duration::from_secs(self.short_interval)
    }

    pub fn long(&self) -> Duration {
        Duration::from_secs(self.long_interval)
    }

    pub fn sweep(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Application name, used both for scripting and the process check
    pub app_name: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            app_name: "Music".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Discord application (client) id
    pub application_id: String,

    /// Any of these being alive means the presence client is reachable
    pub host_apps: Vec<String>,

    /// Asset key shown when the track has no artwork
    pub large_image_fallback: String,

    /// Asset key shown when the artist has no artwork
    pub small_image_fallback: String,

    pub listen_button_label: String,
    pub songlink_button_label: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            application_id: "861702238472241162".to_string(),
            host_apps: vec!["Discord".to_string(), "Vesktop".to_string()],
            large_image_fallback: "applemusic".to_string(),
            small_image_fallback: "play".to_string(),
            listen_button_label: "Listen on Apple Music".to_string(),
            songlink_button_label: "View on SongLink".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Apple Music storefront used for catalog searches
    pub storefront: String,

    /// Width and height substituted into artwork URL templates
    pub artwork_size: u32,

    /// HTTP timeout in seconds
    pub timeout: u64,

    /// Lifetime of cached lookups in seconds
    pub ttl: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            storefront: "US".to_string(),
            artwork_size: 512,
            timeout: 10,
            ttl: 60 * 60,
        }
    }
}

impl MetadataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a resolved track in seconds
    pub song_ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            song_ttl: 24 * 60 * 60,
        }
    }
}

impl CacheConfig {
    pub fn song_ttl(&self) -> Duration {
        Duration::from_secs(self.song_ttl)
    }
}

impl Config {
    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            log::info!("Config file not found, creating default at {:?}", config_path);
            let default_config = Self::default();
            default_config.save_to(config_path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(config_path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let content = self.to_toml()?;

        fs::write(config_path, content)
            .context("Failed to write config file")?;

        log::info!("Config saved to {:?}", config_path);

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll.short_interval == 0 {
            anyhow::bail!("poll.short_interval must be greater than 0");
        }

        if self.poll.long_interval < self.poll.short_interval {
            anyhow::bail!("poll.long_interval must not be shorter than poll.short_interval");
        }

        if self.poll.sweep_interval == 0 {
            anyhow::bail!("poll.sweep_interval must be greater than 0");
        }

        if self.player.app_name.trim().is_empty() {
            anyhow::bail!("player.app_name is required");
        }

        if self.presence.application_id.trim().is_empty() {
            anyhow::bail!("presence.application_id is required");
        }

        if self.presence.host_apps.iter().all(|app| app.trim().is_empty()) {
            anyhow::bail!("presence.host_apps must name at least one application");
        }

        if self.metadata.storefront.trim().is_empty() {
            anyhow::bail!("metadata.storefront is required");
        }

        if self.metadata.artwork_size == 0 {
            anyhow::bail!("metadata.artwork_size must be greater than 0");
        }

        if self.metadata.ttl == 0 || self.cache.song_ttl == 0 {
            log::warn!("A cache TTL of 0 disables caching for that layer");
        }

        Ok(())
    }
}
