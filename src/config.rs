//! Configuration management for toolgate
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.toolgate/config.toml

use crate::errors::{Result, ToolError};
use crate::tools::registry::ToolProfile;
use crate::tools::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete configuration for toolgate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub execution: ExecutionConfig,
    pub container: ContainerConfig,
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,

    /// Profiles added on top of the built-in ones
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<ToolProfile>,
}

/// Process execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Timeout when neither request nor profile sets one
    pub default_timeout_secs: f64,

    /// Per-stream capture cap
    pub max_output_bytes: usize,

    /// Size of the stderr tail quoted in error messages
    pub stderr_excerpt_bytes: usize,

    /// Tool processes allowed to run at once
    pub max_parallel: usize,

    /// Wait for output pipes to close after the child exits
    pub drain_grace_ms: u64,

    /// Search this path instead of `$PATH` for host binaries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_path: Option<String>,
}

/// Container runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Runtime CLI, `docker` or a compatible one such as `podman`
    pub runtime: String,

    pub probe_timeout_secs: f64,

    /// Network for container runs that do not name one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 300.0,
            max_output_bytes: 8 * 1024 * 1024,
            stderr_excerpt_bytes: 2048,
            max_parallel: 4,
            drain_grace_ms: 2000,
            search_path: None,
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            probe_timeout_secs: 5.0,
            network: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ToolError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let config = Self::parse(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without validating
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ToolError::config(format!("Failed to parse config: {}", e)))
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(config_path) if config_path.exists() => Self::load_from_file(&config_path),
            _ => Ok(Config::default()),
        }
    }

    /// `~/.toolgate/config.toml`, when a home directory exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".toolgate").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let timeout = self.execution.default_timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(ToolError::config(
                "default_timeout_secs must be greater than 0",
            ));
        }

        if self.execution.max_output_bytes == 0 {
            return Err(ToolError::config("max_output_bytes must be greater than 0"));
        }

        if self.execution.max_parallel == 0 {
            return Err(ToolError::config("max_parallel must be greater than 0"));
        }

        if self.container.runtime.trim().is_empty() {
            return Err(ToolError::config("container runtime cannot be empty"));
        }

        let probe = self.container.probe_timeout_secs;
        if !probe.is_finite() || probe <= 0.0 {
            return Err(ToolError::config(
                "probe_timeout_secs must be greater than 0",
            ));
        }

        self.retry.validate()?;

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(ToolError::config(format!("Invalid log level: {}", other)))
            }
        }

        for profile in &self.profiles {
            profile.validate()?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ToolError::config(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| ToolError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ToolError::config(format!("Failed to serialize config: {}", e)))
    }
}
