//! Tool request and statistics types

use crate::estimate::TimeoutEstimate;
use crate::normalize::OutputKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One host directory bound into a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub host: PathBuf,
    pub container: String,
}

impl MountSpec {
    pub fn new(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
        }
    }
}

/// A tool call as it arrives from the agent layer
///
/// Every field except `tool` is optional. When a profile is registered for
/// the tool, its argument template, output kind and timeout fill the gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolRequest {
    pub tool: String,

    /// Profile version; latest when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Extra arguments appended after the profile template
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Values for `{param}` placeholders in the profile template
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,

    /// Overrides the profile output kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,

    /// Cost parameters to size the timeout from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<TimeoutEstimate>,

    /// Workload size fed to the profile's estimate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_units: Option<u64>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MountSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn output(mut self, kind: OutputKind) -> Self {
        self.output = Some(kind);
        self
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn mount(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.mounts.push(MountSpec::new(host, container));
        self
    }
}

/// Tool execution statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolStats {
    /// Total executions
    pub total_executions: u64,

    /// Successful executions
    pub successful_executions: u64,

    /// Failed executions, timeouts included
    pub failed_executions: u64,

    pub timeouts: u64,

    /// Total execution time (ms)
    pub total_duration_ms: u64,

    /// Retry attempts
    pub retry_attempts: u64,
}

impl ToolStats {
    /// Record successful execution
    pub fn record_success(&mut self, duration_ms: u64) {
        self.total_executions += 1;
        self.successful_executions += 1;
        self.total_duration_ms += duration_ms;
    }

    /// Record failed execution
    pub fn record_failure(&mut self, duration_ms: u64) {
        self.total_executions += 1;
        self.failed_executions += 1;
        self.total_duration_ms += duration_ms;
    }

    pub fn record_timeout(&mut self, duration_ms: u64) {
        self.record_failure(duration_ms);
        self.timeouts += 1;
    }

    /// Record retry attempts beyond the first
    pub fn record_retries(&mut self, retries: u32) {
        self.retry_attempts += u64::from(retries);
    }

    /// Calculate average duration
    pub fn average_duration_ms(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_executions as f64
        }
    }

    /// Calculate success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }
}
