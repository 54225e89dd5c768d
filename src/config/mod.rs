//! Application configuration

mod app_config;

pub use app_config::AppConfig;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// User preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Display colors for folders, keyed by root-relative folder path.
    /// A UI concern: kept local, never synced.
    pub folder_colors: HashMap<String, String>,
}

/// Default data directory for the application
pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("lightbox"))
        .ok_or_else(|| anyhow::anyhow!("Could not determine platform data directory"))
}
