//! # Splice Core Configuration
//!
//! [`SpliceConfig`] is read from a single file whose format follows its
//! extension (see [`ConfigFormat`]). Every field has a default, so an empty
//! file, or no file at all, is a valid configuration.
//!
//! Lookup order used by [`SpliceConfig::resolve`]: an explicit path, then the
//! file named by `$SPLICE_CONFIG`, then built-in defaults.
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::kernel::constants::{
    CONFIG_ENV_VAR, DEFAULT_BASE_PORT, DEFAULT_BIND_HOST, DEFAULT_INDEX_FILE, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_PORT_SPAN,
};
use crate::kernel::error::{Error, Result};
use crate::plugin_system::stub::PluginId;

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Executer daemon settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Interface for the control port and per-request bootstrap ports
    pub bind_host: String,
    /// Control port; request ports follow it. `0` asks the OS for ephemeral ports instead
    pub base_port: u16,
    /// How many ports after `base_port` requests cycle through
    pub port_span: u16,
    /// Sleep between non-blocking channel attempts
    pub poll_interval_ms: u64,
    /// Program started for each worker; defaults to the running executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_executable: Option<PathBuf>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            base_port: DEFAULT_BASE_PORT,
            port_span: DEFAULT_PORT_SPAN,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            worker_executable: None,
        }
    }
}

impl DaemonSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.bind_host
            .parse()
            .map_err(|e| Error::config(None, format!("invalid daemon.bind_host '{}': {}", self.bind_host, e)))
    }
}

/// Fallback target for execute requests that do not name one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpliceConfig {
    /// Stub index to load; relative paths are resolved against the config file's directory
    pub index: PathBuf,
    pub daemon: DaemonSettings,
    pub execute: ExecuteSettings,
}

impl Default for SpliceConfig {
    fn default() -> Self {
        Self {
            index: PathBuf::from(DEFAULT_INDEX_FILE),
            daemon: DaemonSettings::default(),
            execute: ExecuteSettings::default(),
        }
    }
}

impl SpliceConfig {
    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| Error::config(None, format!("Failed to serialize to JSON: {}", e))),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self)
                .map_err(|e| Error::config(None, format!("Failed to serialize to YAML: {}", e))),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| Error::config(None, format!("Failed to serialize to TOML: {}", e))),
        }
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(data)
                .map_err(|e| Error::config(None, format!("Failed to deserialize from JSON: {}", e))),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data)
                .map_err(|e| Error::config(None, format!("Failed to deserialize from YAML: {}", e))),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data)
                .map_err(|e| Error::config(None, format!("Failed to deserialize from TOML: {}", e))),
        }
    }

    /// Load and validate a configuration file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::config(Some(path.to_path_buf()), "unsupported configuration file extension")
        })?;
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(e, "read_config", path))?;

        let mut config = Self::deserialize(&content, format).map_err(|e| attach_path(e, path))?;
        if config.index.is_relative() {
            if let Some(dir) = path.parent() {
                config.index = dir.join(&config.index);
            }
        }
        config.validate().map_err(|e| attach_path(e, path))?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `explicit`, else from `$SPLICE_CONFIG`, else defaults.
    ///
    /// Returns the configuration and the file it came from, if any.
    pub async fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let from_env = std::env::var_os(CONFIG_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let chosen = explicit.map(Path::to_path_buf).or(from_env);

        match chosen {
            Some(path) => {
                let config = Self::load(&path).await?;
                Ok((config, Some(path)))
            }
            None => {
                log::debug!("No configuration file given; using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.daemon.bind_ip()?;
        if self.daemon.poll_interval_ms == 0 {
            return Err(Error::config(None, "daemon.poll_interval_ms must be greater than zero"));
        }
        if self.daemon.base_port != 0 && self.daemon.port_span == 0 {
            return Err(Error::config(None, "daemon.port_span must be greater than zero"));
        }
        if u32::from(self.daemon.base_port) + u32::from(self.daemon.port_span) > u32::from(u16::MAX) {
            return Err(Error::config(None, "daemon.base_port + daemon.port_span must stay below 65536"));
        }
        Ok(())
    }
}

fn attach_path(error: Error, path: &Path) -> Error {
    match error {
        Error::Config { message, .. } => Error::config(Some(path.to_path_buf()), message),
        other => other,
    }
}
