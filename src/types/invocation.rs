//! Tool invocation parameters
//!
//! A `ToolInvocation` is built once per call through `InvocationBuilder`,
//! validated, and never mutated afterwards.

use crate::errors::{Result, ToolError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Validated, immutable description of one tool run
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    tool_name: String,
    arguments: Vec<String>,
    working_directory: Option<PathBuf>,
    timeout: Duration,
    volume_mounts: BTreeMap<PathBuf, String>,
    env: BTreeMap<String, String>,
    network: Option<String>,
}

impl ToolInvocation {
    /// Start building an invocation for `tool_name`
    pub fn builder(tool_name: impl Into<String>) -> InvocationBuilder {
        InvocationBuilder::new(tool_name)
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Host path → container path, ordered by host path
    pub fn volume_mounts(&self) -> &BTreeMap<PathBuf, String> {
        &self.volume_mounts
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Container network name (container execution only)
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }
}

/// Builder for `ToolInvocation`
///
/// Nothing is checked until `build()`, which reports the first invalid
/// parameter as a `ConfigurationError`.
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    tool_name: String,
    arguments: Vec<String>,
    working_directory: Option<PathBuf>,
    timeout_secs: f64,
    volume_mounts: Vec<(PathBuf, String)>,
    env: BTreeMap<String, String>,
    network: Option<String>,
}

impl InvocationBuilder {
    /// Default timeout when none is set (5 minutes)
    pub const DEFAULT_TIMEOUT_SECS: f64 = 300.0;

    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: Vec::new(),
            working_directory: None,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            volume_mounts: Vec::new(),
            env: BTreeMap::new(),
            network: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.timeout_secs(timeout.as_secs_f64())
    }

    /// Mount `host` at `container` inside the container
    pub fn mount(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.volume_mounts.push((host.into(), container.into()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Validate and freeze the invocation
    pub fn build(self) -> Result<ToolInvocation> {
        let tool_name = self.tool_name.trim().to_string();
        if tool_name.is_empty() {
            return Err(ToolError::config("tool name cannot be empty"));
        }
        if tool_name.chars().any(char::is_whitespace) {
            return Err(ToolError::config(format!(
                "tool name '{}' must not contain whitespace",
                tool_name
            )));
        }

        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(ToolError::config(format!(
                "timeout_seconds must be a positive number, got {}",
                self.timeout_secs
            )));
        }
        let timeout = Duration::try_from_secs_f64(self.timeout_secs).map_err(|e| {
            ToolError::config(format!("invalid timeout {}: {}", self.timeout_secs, e))
        })?;

        let mut volume_mounts = BTreeMap::new();
        for (host, container) in self.volume_mounts {
            if host.as_os_str().is_empty() {
                return Err(ToolError::config("volume mount host path cannot be empty"));
            }
            if !container.starts_with('/') {
                return Err(ToolError::config(format!(
                    "container mount path must be absolute, got '{}'",
                    container
                )));
            }
            if container.contains(':') {
                return Err(ToolError::config(format!(
                    "container mount path must not contain ':', got '{}'",
                    container
                )));
            }
            if let Some(previous) = volume_mounts.insert(host.clone(), container) {
                return Err(ToolError::config(format!(
                    "host path '{}' mounted twice (already at '{}')",
                    host.display(),
                    previous
                )));
            }
        }

        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(ToolError::config(format!(
                    "invalid environment variable name '{}'",
                    key
                )));
            }
        }

        if let Some(network) = &self.network {
            if network.trim().is_empty() {
                return Err(ToolError::config("network name cannot be empty"));
            }
        }

        Ok(ToolInvocation {
            tool_name,
            arguments: self.arguments,
            working_directory: self.working_directory,
            timeout,
            volume_mounts,
            env: self.env,
            network: self.network,
        })
    }
}
