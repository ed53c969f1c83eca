//! Execution adapter
//!
//! Runs a resolved `ExecutionTarget`:
//! - host binary: spawned directly with args, working directory and env
//! - container: `<runtime> run --rm --name <unique> ... <image> <args>`
//!
//! Concurrent runs are bounded by a semaphore. A timed out container is
//! force-removed by name after the client process is killed.

use crate::errors::{Result, ToolError};
use crate::tools::process::{run_captured, CaptureLimits};
use crate::types::{ExecutionMethod, ExecutionResult, ExecutionTarget, ToolInvocation};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default number of tool processes allowed to run at once
pub const MAX_PARALLEL_OPERATIONS: usize = 4;

/// How long `rm -f` of a timed out container may take
pub const CONTAINER_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Executor for resolved tool targets
#[derive(Debug, Clone)]
pub struct Executor {
    semaphore: Arc<Semaphore>,
    capture: CaptureLimits,
    cleanup_timeout: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(MAX_PARALLEL_OPERATIONS, CaptureLimits::default())
    }
}

impl Executor {
    pub fn new(max_parallel: usize, capture: CaptureLimits) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
            capture,
            cleanup_timeout: CONTAINER_CLEANUP_TIMEOUT,
        }
    }

    pub fn with_cleanup_timeout(mut self, cleanup_timeout: Duration) -> Self {
        self.cleanup_timeout = cleanup_timeout;
        self
    }

    /// Run `invocation` on `target`
    ///
    /// A timeout is not an error here: the result carries `timed_out` and
    /// the partial output. Only a failure to start the process is.
    pub async fn execute(
        &self,
        invocation: &ToolInvocation,
        target: &ExecutionTarget,
    ) -> Result<ExecutionResult> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ToolError::config("executor has been shut down"))?;

        match target {
            ExecutionTarget::HostBinary { path } => self.run_host(invocation, path).await,
            ExecutionTarget::Container { runtime, image } => {
                self.run_container(invocation, runtime, image).await
            }
        }
    }

    async fn run_host(&self, invocation: &ToolInvocation, path: &Path) -> Result<ExecutionResult> {
        if !invocation.volume_mounts().is_empty() || invocation.network().is_some() {
            debug!(
                tool = invocation.tool_name(),
                "Mounts and network only apply to container execution, ignoring"
            );
        }

        let mut cmd = Command::new(path);
        cmd.args(invocation.arguments()).envs(invocation.env());
        if let Some(dir) = invocation.working_directory() {
            cmd.current_dir(dir);
        }

        debug!(tool = invocation.tool_name(), path = %path.display(), args = ?invocation.arguments(), "Running host binary");
        run_captured(cmd, invocation.timeout(), self.capture, ExecutionMethod::HostBinary)
            .await
            .map_err(|e| spawn_failed(invocation, path, e))
    }

    async fn run_container(
        &self,
        invocation: &ToolInvocation,
        runtime: &Path,
        image: &str,
    ) -> Result<ExecutionResult> {
        let name = container_name(invocation.tool_name());
        let args = container_args(invocation, image, &name);

        let mut cmd = Command::new(runtime);
        cmd.args(&args);
        if let Some(dir) = invocation.working_directory() {
            cmd.current_dir(dir);
        }

        debug!(tool = invocation.tool_name(), container = %name, ?args, "Running container");
        let result = run_captured(cmd, invocation.timeout(), self.capture, ExecutionMethod::Container)
            .await
            .map_err(|e| spawn_failed(invocation, runtime, e))?;

        // killing the client does not stop the container itself
        if result.timed_out {
            self.remove_container(runtime, &name).await;
        }
        Ok(result)
    }

    async fn remove_container(&self, runtime: &Path, name: &str) {
        let mut cmd = Command::new(runtime);
        cmd.args(["rm", "-f", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match timeout(self.cleanup_timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => debug!(container = name, "Removed timed out container"),
            Ok(Ok(status)) => warn!(container = name, %status, "Container removal failed"),
            Ok(Err(e)) => warn!(container = name, error = %e, "Container removal failed to start"),
            Err(_) => warn!(container = name, "Container removal timed out"),
        }
    }
}

fn spawn_failed(invocation: &ToolInvocation, program: &Path, e: std::io::Error) -> ToolError {
    ToolError::ExecutionFailed {
        tool: invocation.tool_name().to_string(),
        exit_code: None,
        stderr_excerpt: format!("failed to start {}: {}", program.display(), e),
        partial: serde_json::Value::Null,
    }
}

/// Unique container name for one run
pub fn container_name(tool: &str) -> String {
    let slug: String = tool
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("toolgate-{}-{}", slug.trim_matches('-'), &id[..12])
}

/// Argument vector passed to the container runtime
pub fn container_args(invocation: &ToolInvocation, image: &str, name: &str) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        name.to_string(),
    ];

    if let Some(network) = invocation.network() {
        args.push("--network".to_string());
        args.push(network.to_string());
    }

    for (key, value) in invocation.env() {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }

    for (host, container) in invocation.volume_mounts() {
        let host = absolute_host_path(host, invocation.working_directory());
        args.push("-v".to_string());
        args.push(format!("{}:{}", host.display(), container));
    }

    args.push(image.to_string());
    args.extend(invocation.arguments().iter().cloned());
    args
}

/// Bind mounts need absolute host paths; relative ones are taken against
/// the working directory, then the current directory.
pub fn absolute_host_path(host: &Path, working_dir: Option<&Path>) -> PathBuf {
    if host.is_absolute() {
        return host.to_path_buf();
    }
    match working_dir {
        Some(dir) if dir.is_absolute() => dir.join(host),
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(working_dir.unwrap_or(Path::new(""))).join(host))
            .unwrap_or_else(|_| host.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> ToolInvocation {
        ToolInvocation::builder("amass")
            .args(["enum", "-d", "example.com"])
            .mount("/data/amass", "/.config/amass")
            .env("AMASS_DEBUG", "1")
            .network("recon")
            .build()
            .unwrap()
    }

    #[test]
    fn test_container_args_layout() {
        let args = container_args(&invocation(), "caffix/amass:v3.19", "toolgate-amass-x");
        assert_eq!(
            args,
            vec![
                "run", "--rm", "--name", "toolgate-amass-x",
                "--network", "recon",
                "-e", "AMASS_DEBUG=1",
                "-v", "/data/amass:/.config/amass",
                "caffix/amass:v3.19",
                "enum", "-d", "example.com",
            ]
        );
    }

    #[test]
    fn test_container_name_unique_and_safe() {
        let a = container_name("Amass v3");
        let b = container_name("Amass v3");
        assert_ne!(a, b);
        assert!(a.starts_with("toolgate-amass-v3-"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_relative_mount_uses_working_dir() {
        let path = absolute_host_path(Path::new("out"), Some(Path::new("/work")));
        assert_eq!(path, PathBuf::from("/work/out"));
        assert!(absolute_host_path(Path::new("out"), None).is_absolute());
    }
}
