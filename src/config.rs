//! Configuration types for the vigil server.

use crate::alerts::AlertDefinition;
use crate::error::{Result, VigilError};
use crate::scheduler::FirstTick;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vigil_lookup::LookupConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Company lookup and cache settings.
    pub lookup: LookupConfig,
    /// Alert scan task settings.
    pub alerts: AlertsConfig,
    /// Background maintenance settings.
    pub maintenance: MaintenanceConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind. `0` picks a free port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

/// Alert scan task configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Whether the `scan_alerts` task is scheduled at all.
    pub enabled: bool,
    /// Milliseconds between scan ticks.
    pub scan_interval_ms: u64,
    /// Whether the first scan runs at startup or after one interval.
    pub first_tick: FirstTick,
    /// Alerts loaded into the in-memory alert source at bootstrap.
    pub definitions: Vec<AlertDefinition>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_ms: 60_000,
            first_tick: FirstTick::Immediate,
            definitions: Vec::new(),
        }
    }
}

impl AlertsConfig {
    /// Scan interval as a [`Duration`].
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between sweeps of expired lookup cache entries. `0` disables the sweep.
    pub cache_purge_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cache_purge_interval_secs: 300,
        }
    }
}

impl VigilConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| VigilError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VigilError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/vigil/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("vigil").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("vigil")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/vigil-config/config.toml")
        }
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(VigilError::Config("server.host must not be empty".into()));
        }
        if self.alerts.enabled && self.alerts.scan_interval_ms == 0 {
            return Err(VigilError::Config(
                "alerts.scan_interval_ms must be greater than 0".into(),
            ));
        }
        let mut ids = std::collections::HashSet::new();
        for alert in &self.alerts.definitions {
            if alert.id.trim().is_empty() {
                return Err(VigilError::Config(
                    "alerts.definitions: id must not be empty".into(),
                ));
            }
            if !ids.insert(alert.id.as_str()) {
                return Err(VigilError::Config(format!(
                    "alerts.definitions: duplicate id {}",
                    alert.id
                )));
            }
        }
        self.lookup
            .validate()
            .map_err(|e| VigilError::Config(format!("lookup: {e}")))
    }
}
