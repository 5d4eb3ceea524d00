use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::sync::{MonitorConfig, RetryPolicy, SyncConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub sync: SyncSettings,
  #[serde(default)]
  pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL every relative endpoint resolves against
  pub base_url: String,
  /// Path probed to detect connectivity
  #[serde(default = "default_health_path")]
  pub health_path: String,
}

fn default_health_path() -> String {
  "/health".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
  /// Upper bound on each replayed request
  pub request_timeout_secs: u64,
  /// Wait after connectivity returns before draining
  pub settle_delay_ms: u64,
  pub probe_interval_secs: u64,
  /// Failed attempts before an item is dead-lettered; unset retries forever
  pub max_attempts: Option<u32>,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      request_timeout_secs: 30,
      settle_delay_ms: 1500,
      probe_interval_secs: 15,
      max_attempts: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
  /// Origin the fetch gateway resolves relative paths against.
  /// Defaults to the API base URL.
  pub origin: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./bolso.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/bolso/config.yaml
  /// 4. ~/.config/bolso/config.yaml
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
        "No configuration file found. Create one at ~/.config/bolso/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("bolso.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("bolso").join("config.yaml");
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

  /// Bearer token from the environment, when the user is logged in.
  pub fn api_token() -> Option<String> {
    std::env::var("BOLSO_API_TOKEN").ok()
  }

  pub fn api_base(&self) -> Result<Url> {
    Url::parse(&self.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url '{}': {}", self.api.base_url, e))
  }

  /// URL probed by the connectivity monitor.
  pub fn probe_url(&self) -> Result<Url> {
    self
      .api_base()?
      .join(&self.api.health_path)
      .map_err(|e| eyre!("Invalid api.health_path '{}': {}", self.api.health_path, e))
  }

  /// Origin the fetch gateway resolves relative paths against.
  pub fn gateway_origin(&self) -> Result<Url> {
    match &self.cache.origin {
      Some(origin) => {
        Url::parse(origin).map_err(|e| eyre!("Invalid cache.origin '{}': {}", origin, e))
      }
      None => self.api_base(),
    }
  }

  /// Explicit engine configuration; nothing else is read from globals.
  pub fn sync_config(&self) -> Result<SyncConfig> {
    Ok(SyncConfig {
      api_base: self.api_base()?,
      token: Self::api_token(),
      request_timeout: Duration::from_secs(self.sync.request_timeout_secs),
    })
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.sync.max_attempts,
    }
  }

  pub fn monitor_config(&self) -> Result<MonitorConfig> {
    Ok(MonitorConfig {
      probe_url: self.probe_url()?,
      probe_interval: Duration::from_secs(self.sync.probe_interval_secs),
      settle_delay: Duration::from_millis(self.sync.settle_delay_ms),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config: Config = serde_yaml::from_str(
      "api:\n  base_url: https://api.bolso.example\n",
    )
    .unwrap();

    assert_eq!(config.api.health_path, "/health");
    assert_eq!(config.sync.request_timeout_secs, 30);
    assert_eq!(config.sync.max_attempts, None);

    let probe = config.probe_url().unwrap();
    assert_eq!(probe.as_str(), "https://api.bolso.example/health");
  }

  #[test]
  fn test_bounded_retry_policy_from_config() {
    let config: Config = serde_yaml::from_str(
      "api:\n  base_url: https://api.bolso.example\nsync:\n  max_attempts: 5\n",
    )
    .unwrap();

    assert_eq!(config.retry_policy().max_attempts, Some(5));
  }
}
