//! labelflow configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Main labelflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend API configuration
    pub api: ApiConfig,

    /// Raw image loading configuration
    pub raw: RawConfig,

    /// Actor mailbox sizes
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that URLs parse. Call this early in startup to fail fast with
    /// clear error messages.
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid api base-url: {}", self.api.base_url))?;
        if let Some(url) = &self.raw.base_url {
            reqwest::Url::parse(url).with_context(|| format!("Invalid raw base-url: {}", url))?;
        }
        if self.coordinator.channel_buffer == 0 || self.coordinator.channel_actor_buffer == 0 {
            return Err(eyre::eyre!("Coordinator channel buffers must be non-zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .labelflow.yml
        let local_config = PathBuf::from(".labelflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/labelflow/labelflow.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("labelflow").join("labelflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Origin of the label backend
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Export in tracking format (`trk`) instead of `npz`
    pub track: bool,

    /// Where downloaded exports are saved
    #[serde(rename = "download-dir")]
    pub download_dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_ms: 60_000,
            track: false,
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Raw image loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// Origin serving raw frames; the api base-url when unset
    #[serde(rename = "base-url")]
    pub base_url: Option<String>,

    /// Per-frame fetch timeout in milliseconds
    #[serde(rename = "fetch-timeout-ms")]
    pub fetch_timeout_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            fetch_timeout_ms: 30_000,
        }
    }
}

impl RawConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Actor mailbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Mailbox size of each coordinator
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Mailbox size of each channel actor
    #[serde(rename = "channel-actor-buffer", default = "default_channel_actor_buffer")]
    pub channel_actor_buffer: usize,
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    256
}

fn default_channel_actor_buffer() -> usize {
    debug!("default_channel_actor_buffer: called");
    64
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
            channel_actor_buffer: default_channel_actor_buffer(),
        }
    }
}
