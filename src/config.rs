use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::notify::NotificationPreference;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the cached resources are fetched from (e.g. "https://timer.example.com")
  pub origin: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Cache generation identifier; bumping it garbage-collects the prior generation
  #[serde(default = "default_cache_version")]
  pub version: String,
  /// Override for the cache database location (default: data dir)
  pub db_path: Option<PathBuf>,
  /// Resources fetched and stored at install time and on explicit refresh
  #[serde(default = "default_warm_up")]
  pub warm_up: Vec<String>,
  /// Page served when a navigation request fails and no cached copy exists
  #[serde(default = "default_offline_page")]
  pub offline_page: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_cache_version(),
      db_path: None,
      warm_up: default_warm_up(),
      offline_page: default_offline_page(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Remote key-value store endpoint for cross-device snapshots
  #[serde(default = "default_sync_endpoint")]
  pub endpoint: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      endpoint: default_sync_endpoint(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
  /// User's stored notification choice, consulted before any schedule command
  #[serde(default)]
  pub preference: NotificationPreference,
}

fn default_cache_version() -> String {
  "v1".to_string()
}

fn default_warm_up() -> Vec<String> {
  // Only paths guaranteed to exist; anything else is cached opportunistically
  // by the fetch interceptor.
  vec![
    "/".to_string(),
    "/favicon.ico".to_string(),
    "/site.webmanifest".to_string(),
  ]
}

fn default_offline_page() -> String {
  "/offline.html".to_string()
}

fn default_sync_endpoint() -> String {
  "https://cache.ravelloh.top/api".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pulsed.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pulsed/config.yaml
  /// 4. ~/.config/pulsed/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/pulsed/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pulsed.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pulsed").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the sync slot password from environment variables.
  ///
  /// Checks PULSED_SYNC_SECRET so the secret never has to appear on the
  /// command line.
  pub fn get_sync_secret() -> Result<String> {
    std::env::var("PULSED_SYNC_SECRET")
      .map_err(|_| eyre!("Sync secret not found. Set the PULSED_SYNC_SECRET environment variable."))
  }
}
