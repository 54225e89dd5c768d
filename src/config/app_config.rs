//! Application configuration file

use super::{default_data_dir, Preferences};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_FILE: &str = "lightbox.json";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config schema version
    pub version: u32,

    /// Data directory path
    pub data_dir: PathBuf,

    /// The media root currently cataloged, if one was chosen
    pub root_path: Option<PathBuf>,

    /// Logging level
    pub log_level: String,

    /// User preferences
    pub preferences: Preferences,
}

impl AppConfig {
    const TARGET_VERSION: u32 = 1;

    /// Load configuration from a specific data directory
    pub fn load_from(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);

        if config_path.exists() {
            info!("Loading config from {:?}", config_path);
            let json = fs::read_to_string(&config_path)?;
            let mut config: AppConfig = serde_json::from_str(&json)?;

            if config.version < Self::TARGET_VERSION {
                info!(
                    "Migrating config from v{} to v{}",
                    config.version,
                    Self::TARGET_VERSION
                );
                config.migrate()?;
                config.save()?;
            }

            Ok(config)
        } else {
            warn!("No config found, creating default at {:?}", config_path);
            let config = Self::default_with_dir(data_dir.to_path_buf());
            config.save()?;
            Ok(config)
        }
    }

    /// Load or create configuration
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        Self::load_from(data_dir).or_else(|_| {
            let config = Self::default_with_dir(data_dir.to_path_buf());
            config.save()?;
            Ok(config)
        })
    }

    /// Create default configuration with specific data directory
    pub fn default_with_dir(data_dir: PathBuf) -> Self {
        Self {
            version: Self::TARGET_VERSION,
            data_dir,
            root_path: None,
            log_level: "info".to_string(),
            preferences: Preferences::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        let config_path = self.data_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, json)?;
        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the path of the catalog database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("catalog.db")
    }

    /// Get the path for the thumbnails directory
    pub fn thumbnails_dir(&self) -> PathBuf {
        self.data_dir.join("thumbnails")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(self.thumbnails_dir())?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<()> {
        match self.version {
            0 => {
                self.version = 1;
                Ok(())
            }
            1 => Ok(()),
            v => Err(anyhow!("Unknown config version: {}", v)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::default_with_dir(data_dir)
    }
}
