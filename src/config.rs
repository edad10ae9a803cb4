//! Service configuration
//!
//! Read from a YAML file, then overridden by environment variables (a `.env`
//! file is loaded by the binary before this runs).

use std::env;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub image_host: ImageHostConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
    /// Logged mutations per collection between snapshots
    pub snapshot_every: usize,
    pub memory_only: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: "./data".to_string(),
            snapshot_every: 64,
            memory_only: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageHostConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

impl Default for ImageHostConfig {
    fn default() -> Self {
        ImageHostConfig {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            folder: "serials".to_string(),
        }
    }
}

impl ImageHostConfig {
    pub fn is_configured(&self) -> bool {
        !self.cloud_name.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl Config {
    /// Defaults suitable for tests: nothing touches the disk
    pub fn in_memory() -> Self {
        let mut config = Config::default();
        config.storage.memory_only = true;
        config
    }
}

/// Load the YAML file at `path` (defaults when it does not exist) and apply
/// environment overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut config = match fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e.into()),
    };

    apply_env(&mut config, |key| env::var(key).ok())?;
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

fn apply_env<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup("CLINICDB_DATA_PATH") {
        config.storage.path = path;
    }
    if let Some(host) = lookup("HOST") {
        config.api.host = host;
    }
    if let Some(port) = lookup("PORT") {
        config.api.port = port
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { key: "PORT", value: port })?;
    }
    if let Some(cloud_name) = lookup("CLOUD_NAME") {
        config.image_host.cloud_name = cloud_name;
    }
    if let Some(api_key) = lookup("API_KEY") {
        config.image_host.api_key = api_key;
    }
    if let Some(api_secret) = lookup("API_SECRET") {
        config.image_host.api_secret = api_secret;
    }
    Ok(())
}
