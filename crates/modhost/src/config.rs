//! Configuration management for the mod host.
//!
//! This module handles loading and validation of host configuration from
//! TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Default tick interval for serde deserialization
fn default_tick_interval() -> u64 {
    50 // 20 ticks per second
}

fn default_host_version() -> String {
    "1.0.0".to_string()
}

fn default_mods_directory() -> String {
    "mods".to_string()
}

fn default_manifest_name() -> String {
    "mod.json".to_string()
}

fn default_params_file() -> String {
    "mod_params.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure encompassing host settings,
/// mod discovery and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host process settings
    #[serde(default)]
    pub host: HostSettings,
    /// Mod discovery and loading settings
    #[serde(default)]
    pub mods: ModSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HostSettings::default(),
            mods: ModSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Host process settings.
///
/// Controls the version mods compatibility-check against and the tick loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// Version string mods compare their `hostVersion` requirement against
    #[serde(default = "default_host_version")]
    pub version: String,
    /// Tick interval in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            version: default_host_version(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// Mod discovery and loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModSettings {
    /// Directory scanned for mod subdirectories
    #[serde(default = "default_mods_directory")]
    pub directory: String,
    /// Manifest filename looked for in each mod directory
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
    /// File storing per-mod enabled flags, relative to the mods directory
    #[serde(default = "default_params_file")]
    pub params_file: String,
    /// Whether to load every enabled mod on startup
    #[serde(default = "default_true")]
    pub auto_load: bool,
    /// Whether to check release feeds for updates at startup
    #[serde(default = "default_true")]
    pub check_updates: bool,
}

impl Default for ModSettings {
    fn default() -> Self {
        Self {
            directory: default_mods_directory(),
            manifest_name: default_manifest_name(),
            params_file: default_params_file(),
            auto_load: true,
            check_updates: true,
        }
    }
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    #[serde(default)]
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, creating a default file when
    /// none exists.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the merged configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.tick_interval_ms == 0 {
            return Err("Tick interval must be at least 1ms".to_string());
        }

        if self.mods.directory.is_empty() {
            return Err("Mods directory cannot be empty".to_string());
        }
        if self.mods.manifest_name.is_empty() {
            return Err("Manifest name cannot be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    /// Path of the persisted mod-parameters file.
    pub fn params_path(&self) -> PathBuf {
        PathBuf::from(&self.mods.directory).join(&self.mods.params_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::fs;

    #[test]
    fn default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.host.tick_interval_ms, 50);
        assert_eq!(config.mods.manifest_name, "mod.json");
        assert!(config.mods.auto_load);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.host.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        config.host.tick_interval_ms = 50;
        config.mods.directory = String::new();
        assert!(config.validate().is_err());

        config.mods.directory = "mods".to_string();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn load_from_missing_file_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.mods.directory, "mods");
        assert!(path.exists());

        // The created file parses back to the same settings.
        let reread = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reread.host.tick_interval_ms, config.host.tick_interval_ms);
    }

    #[tokio::test]
    async fn load_from_existing_file() {
        let toml_content = r#"
[host]
version = "2.3.0"
tick_interval_ms = 33

[mods]
directory = "/opt/modhost/mods"
auto_load = false
check_updates = false

[logging]
level = "debug"
json_format = true
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.host.version, "2.3.0");
        assert_eq!(config.host.tick_interval_ms, 33);
        assert_eq!(config.mods.directory, "/opt/modhost/mods");
        assert!(!config.mods.auto_load);
        assert!(!config.mods.check_updates);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.mods.manifest_name, "mod.json");
        assert_eq!(config.mods.params_file, "mod_params.json");
    }
}
