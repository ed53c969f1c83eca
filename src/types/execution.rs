//! Raw execution results
//!
//! What the execution adapter hands to the normalizer: exit status, the
//! captured streams and how the tool was run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How a tool was executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMethod {
    HostBinary,
    Container,
}

impl ExecutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMethod::HostBinary => "host_binary",
            ExecutionMethod::Container => "container",
        }
    }
}

impl fmt::Display for ExecutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved execution target for a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ExecutionTarget {
    /// Executable found on the search path
    HostBinary { path: PathBuf },

    /// Image run through a container runtime CLI
    Container { runtime: PathBuf, image: String },
}

impl ExecutionTarget {
    pub fn method(&self) -> ExecutionMethod {
        match self {
            ExecutionTarget::HostBinary { .. } => ExecutionMethod::HostBinary,
            ExecutionTarget::Container { .. } => ExecutionMethod::Container,
        }
    }
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionTarget::HostBinary { path } => write!(f, "host binary {}", path.display()),
            ExecutionTarget::Container { runtime, image } => {
                write!(f, "container {} via {}", image, runtime.display())
            }
        }
    }
}

/// Result of running one process (or one container lifecycle)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code; `None` when the process was killed or died by signal
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    pub wall_clock_seconds: f64,

    pub execution_method: ExecutionMethod,

    /// The timeout fired and the process was terminated
    pub timed_out: bool,

    /// At least one stream exceeded the capture cap
    pub truncated: bool,

    /// Timeout budget that expired; set only when `timed_out` is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

impl ExecutionResult {
    /// Completed run with the given exit code
    pub fn completed(
        exit_code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        elapsed: Duration,
        execution_method: ExecutionMethod,
    ) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            wall_clock_seconds: elapsed.as_secs_f64(),
            execution_method,
            timed_out: false,
            truncated: false,
            timeout_secs: None,
        }
    }

    /// Run terminated by the timeout, carrying partial output
    pub fn timed_out(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        elapsed: Duration,
        budget: Duration,
        execution_method: ExecutionMethod,
    ) -> Self {
        Self {
            exit_code: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
            wall_clock_seconds: elapsed.as_secs_f64(),
            execution_method,
            timed_out: true,
            truncated: false,
            timeout_secs: Some(budget.as_secs_f64()),
        }
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Exit code zero and no timeout
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}
