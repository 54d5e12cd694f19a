use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use anyhow::Result;

use crate::protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_EXTENSION, DEFAULT_PORT};

pub const DEFAULT_CONFIG_FILE: &str = "mediaput.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub storage_directory: PathBuf,
    pub chunk_size: usize,
    /// Runtime worker threads; 0 means one per available core
    pub workers: usize,
    pub auto_create_directories: bool,
    pub quota_bytes: Option<u64>,
    pub file_extension: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: format!("127.0.0.1:{}", DEFAULT_PORT),
            storage_directory: PathBuf::from("./uploads"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 0,
            auto_create_directories: true,
            quota_bytes: None,
            file_extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn worker_threads(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if self.auto_create_directories && !self.storage_directory.exists() {
            std::fs::create_dir_all(&self.storage_directory)?;
            tracing::info!("Created storage directory: {:?}", self.storage_directory);
        }
        if !self.storage_directory.is_dir() {
            anyhow::bail!("storage directory {:?} does not exist", self.storage_directory);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub chunk_size: usize,
    pub required_extension: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            timeout_secs: 10,
            chunk_size: DEFAULT_CHUNK_SIZE,
            required_extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// On-disk layout: `[server]` and `[client]` tables
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl ConfigFile {
    /// Read the file if present, otherwise defaults. Never writes.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        if std::path::Path::new(config_file).exists() {
            let content = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_or_create(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        if std::path::Path::new(config_file).exists() {
            let content = std::fs::read_to_string(config_file)?;
            let config: ConfigFile = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(config_file)?;
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }
}
