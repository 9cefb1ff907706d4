//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use unu_core::{ManagerConfig, ReconnectOptions, ScanStrategy};

use crate::cli::{ConfigKey, OutputFormat, ScooterArgs, parse_bool_arg};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Advertised scooter name
    #[serde(default)]
    pub device_name: Option<String>,

    /// Default output format
    #[serde(default)]
    pub format: Option<String>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// Scan timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Use the phased scan
    #[serde(default)]
    pub phased: bool,

    /// Reconnect attempts before giving up (unlimited when unset)
    #[serde(default)]
    pub max_reconnects: Option<u32>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("unu")
            .join("config.toml")
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from a specific file, or return default if unreadable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to a specific file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Set a key from its command-line text.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::DeviceName => {
                if value.is_empty() {
                    bail!("device_name must not be empty");
                }
                self.device_name = Some(value.to_string());
            }
            ConfigKey::Timeout => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("'{}' is not a valid number of seconds", value))?;
                if secs == 0 {
                    bail!("timeout must be > 0");
                }
                self.timeout = Some(secs);
            }
            ConfigKey::Phased => {
                self.phased = parse_bool_arg(value).map_err(anyhow::Error::msg)?;
            }
            ConfigKey::Format => {
                let format = value.to_lowercase();
                if format != "text" && format != "json" {
                    bail!("Invalid format '{}'. Valid values: text, json", value);
                }
                self.format = Some(format);
            }
            ConfigKey::NoColor => {
                self.no_color = parse_bool_arg(value).map_err(anyhow::Error::msg)?;
            }
            ConfigKey::MaxReconnects => {
                let attempts: u32 = value
                    .parse()
                    .with_context(|| format!("'{}' is not a valid number", value))?;
                self.max_reconnects = Some(attempts);
            }
        }
        Ok(())
    }

    /// Reset a key to its default.
    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::DeviceName => self.device_name = None,
            ConfigKey::Timeout => self.timeout = None,
            ConfigKey::Phased => self.phased = false,
            ConfigKey::Format => self.format = None,
            ConfigKey::NoColor => self.no_color = false,
            ConfigKey::MaxReconnects => self.max_reconnects = None,
        }
    }

    /// Output format from the flag, then the config, then text.
    pub fn resolve_format(&self, arg: Option<OutputFormat>) -> OutputFormat {
        arg.unwrap_or_else(|| match self.format.as_deref() {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Text,
        })
    }

    /// Build the manager configuration, with flags taking precedence over the file.
    pub fn manager_config(
        &self,
        args: &ScooterArgs,
        max_reconnects: Option<u32>,
    ) -> Result<ManagerConfig> {
        let mut config = ManagerConfig::default();
        if let Some(name) = args.device_name.clone().or_else(|| self.device_name.clone()) {
            config = config.device_name(name);
        }
        if let Some(secs) = args.timeout.or(self.timeout) {
            config = config.scan_timeout(Duration::from_secs(secs));
        }
        if args.phased || self.phased {
            config = config.scan_strategy(ScanStrategy::phased());
        }
        if let Some(attempts) = max_reconnects.or(self.max_reconnects) {
            config = config.reconnect(ReconnectOptions::default().max_attempts(attempts));
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
