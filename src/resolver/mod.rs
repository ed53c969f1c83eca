//! Binary/container resolver
//!
//! Decides how a tool runs:
//! 1. An executable of that name on the search path → host binary
//! 2. A reachable container runtime plus a registered image → container
//! 3. Otherwise `ToolUnavailable`, naming both checks
//!
//! Results are cached per resolver instance. The cache belongs to the
//! caller and is cleared with `invalidate()`.

pub mod search;

pub use search::find_executable;

use crate::errors::{Result, ToolError};
use crate::types::ExecutionTarget;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Default container runtime CLI
pub const DEFAULT_RUNTIME: &str = "docker";

/// Default runtime probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TargetKey {
    tool: String,
    binary: String,
    image: Option<String>,
}

#[derive(Debug, Default)]
struct ResolverCache {
    /// Outcome of the runtime probe: runtime path or why it is unusable
    runtime: Option<std::result::Result<PathBuf, String>>,

    targets: HashMap<TargetKey, ExecutionTarget>,
}

/// Resolver for tool execution targets
#[derive(Debug)]
pub struct Resolver {
    runtime: String,
    probe_timeout: Duration,
    search_path: Option<OsString>,
    images: HashMap<String, String>,
    binaries: HashMap<String, String>,
    cache: Mutex<ResolverCache>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME)
    }
}

impl Resolver {
    /// Create resolver using the given container runtime CLI
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            search_path: None,
            images: HashMap::new(),
            binaries: HashMap::new(),
            cache: Mutex::new(ResolverCache::default()),
        }
    }

    /// Search this path instead of `$PATH`
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Tool name → container image
    pub fn with_images(mut self, images: HashMap<String, String>) -> Self {
        self.images.extend(images);
        self
    }

    /// Tool name → host executable name, for tools whose binary differs
    pub fn with_binaries(mut self, binaries: HashMap<String, String>) -> Self {
        self.binaries.extend(binaries);
        self
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    pub fn image_for(&self, tool: &str) -> Option<&str> {
        self.images.get(tool).map(String::as_str)
    }

    fn binary_for<'a>(&'a self, tool: &'a str) -> &'a str {
        self.binaries.get(tool).map(String::as_str).unwrap_or(tool)
    }

    /// Resolve an execution target for `tool`
    pub async fn resolve(&self, tool: &str) -> Result<ExecutionTarget> {
        let image = self.images.get(tool).map(String::as_str);
        self.resolve_with(tool, self.binary_for(tool), image).await
    }

    /// Resolve with an explicit binary name and image
    ///
    /// Used for versioned profiles, where the image differs per version.
    pub async fn resolve_with(
        &self,
        tool: &str,
        binary: &str,
        image: Option<&str>,
    ) -> Result<ExecutionTarget> {
        let key = TargetKey {
            tool: tool.to_string(),
            binary: binary.to_string(),
            image: image.map(str::to_string),
        };
        let cached = self.lock_cache().targets.get(&key).cloned();
        if let Some(target) = cached {
            return Ok(target);
        }

        let host_check = match find_executable(binary, self.search_path.as_deref()) {
            Some(path) => {
                debug!(tool, path = %path.display(), "Resolved host binary");
                return Ok(self.remember(key, ExecutionTarget::HostBinary { path }));
            }
            None => format!("no executable '{}' on the search path", binary),
        };

        let container_check = match self.container_target(tool, image).await {
            Ok(target) => {
                debug!(tool, %target, "Resolved container execution");
                return Ok(self.remember(key, target));
            }
            Err(reason) => reason,
        };

        Err(ToolError::ToolUnavailable {
            tool: tool.to_string(),
            host_check,
            container_check,
        })
    }

    /// The image is checked first so tools without one never trigger a
    /// runtime probe.
    async fn container_target(
        &self,
        tool: &str,
        image: Option<&str>,
    ) -> std::result::Result<ExecutionTarget, String> {
        let image =
            image.ok_or_else(|| format!("no container image registered for '{}'", tool))?;
        let runtime = self.probe_runtime().await?;
        Ok(ExecutionTarget::Container {
            runtime,
            image: image.to_string(),
        })
    }

    /// Whether the container runtime is reachable (cached)
    pub async fn probe_runtime(&self) -> std::result::Result<PathBuf, String> {
        let cached = self.lock_cache().runtime.clone();
        if let Some(outcome) = cached {
            return outcome;
        }

        let outcome = self.run_runtime_probe().await;
        debug!(runtime = %self.runtime, reachable = outcome.is_ok(), "Probed container runtime");
        self.lock_cache().runtime = Some(outcome.clone());
        outcome
    }

    async fn run_runtime_probe(&self) -> std::result::Result<PathBuf, String> {
        let path = find_executable(&self.runtime, self.search_path.as_deref())
            .ok_or_else(|| format!("container runtime '{}' not found", self.runtime))?;

        let mut cmd = Command::new(&path);
        cmd.arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match timeout(self.probe_timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => Ok(path),
            Ok(Ok(status)) => Err(format!(
                "container runtime '{}' not reachable ({})",
                self.runtime, status
            )),
            Ok(Err(e)) => Err(format!(
                "container runtime '{}' failed to start: {}",
                self.runtime, e
            )),
            Err(_) => Err(format!(
                "container runtime '{}' did not answer within {:?}",
                self.runtime, self.probe_timeout
            )),
        }
    }

    /// Drop every cached resolution and the runtime probe
    pub fn invalidate(&self) {
        let mut cache = self.lock_cache();
        cache.runtime = None;
        cache.targets.clear();
    }

    /// Drop the cached resolutions of one tool
    pub fn invalidate_tool(&self, tool: &str) {
        self.lock_cache().targets.retain(|key, _| key.tool != tool);
    }

    fn remember(&self, key: TargetKey, target: ExecutionTarget) -> ExecutionTarget {
        self.lock_cache().targets.insert(key, target.clone());
        target
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ResolverCache> {
        // the cache holds plain data, a poisoned lock is still consistent
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn resolver_in(dir: &TempDir) -> Resolver {
        Resolver::new("fake-docker").with_search_path(dir.path().as_os_str())
    }

    #[tokio::test]
    async fn test_host_binary_preferred() {
        let temp = TempDir::new().unwrap();
        let tool = script(temp.path(), "subfinder", "exit 0");
        script(temp.path(), "fake-docker", "exit 0");

        let mut images = HashMap::new();
        images.insert("subfinder".to_string(), "projectdiscovery/subfinder".to_string());
        let resolver = resolver_in(&temp).with_images(images);

        let target = resolver.resolve("subfinder").await.unwrap();
        assert_eq!(target, ExecutionTarget::HostBinary { path: tool });
    }

    #[tokio::test]
    async fn test_container_fallback() {
        let temp = TempDir::new().unwrap();
        let runtime = script(temp.path(), "fake-docker", "exit 0");

        let mut images = HashMap::new();
        images.insert("nuclei".to_string(), "projectdiscovery/nuclei".to_string());
        let resolver = resolver_in(&temp).with_images(images);

        let target = resolver.resolve("nuclei").await.unwrap();
        assert_eq!(
            target,
            ExecutionTarget::Container {
                runtime,
                image: "projectdiscovery/nuclei".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unavailable_names_both_checks() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver_in(&temp);

        let err = resolver.resolve("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolUnavailable);
        let msg = err.to_string();
        assert!(msg.contains("no executable 'ghost'"));
        assert!(msg.contains("no container image registered"));
    }

    #[tokio::test]
    async fn test_unreachable_runtime() {
        let temp = TempDir::new().unwrap();
        script(temp.path(), "fake-docker", "exit 1");

        let mut images = HashMap::new();
        images.insert("nuclei".to_string(), "projectdiscovery/nuclei".to_string());
        let resolver = resolver_in(&temp).with_images(images);

        let err = resolver.resolve("nuclei").await.unwrap_err();
        assert!(err.to_string().contains("not reachable"));
    }

    #[tokio::test]
    async fn test_binary_alias() {
        let temp = TempDir::new().unwrap();
        let path = script(temp.path(), "theHarvester", "exit 0");

        let mut binaries = HashMap::new();
        binaries.insert("theharvester".to_string(), "theHarvester".to_string());
        let resolver = resolver_in(&temp).with_binaries(binaries);

        let target = resolver.resolve("theharvester").await.unwrap();
        assert_eq!(target, ExecutionTarget::HostBinary { path });
    }

    #[tokio::test]
    async fn test_resolve_with_distinct_images() {
        let temp = TempDir::new().unwrap();
        script(temp.path(), "fake-docker", "exit 0");
        let resolver = resolver_in(&temp);

        let old = resolver
            .resolve_with("amass", "amass", Some("caffix/amass:v3.19"))
            .await
            .unwrap();
        let new = resolver
            .resolve_with("amass", "amass", Some("caffix/amass:v4.2"))
            .await
            .unwrap();
        assert_ne!(old, new);

        resolver.invalidate_tool("amass");
        assert!(resolver.resolve_with("amass", "amass", None).await.is_err());
    }

    #[tokio::test]
    async fn test_cache_and_invalidate() {
        let temp = TempDir::new().unwrap();
        let path = script(temp.path(), "cached", "exit 0");
        let resolver = resolver_in(&temp);

        assert!(resolver.resolve("cached").await.is_ok());

        // still resolved from cache after the binary disappears
        std::fs::remove_file(&path).unwrap();
        assert!(resolver.resolve("cached").await.is_ok());

        resolver.invalidate();
        assert!(resolver.resolve("cached").await.is_err());
    }

    #[tokio::test]
    async fn test_runtime_probe_cached_until_invalidated() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver_in(&temp);

        assert!(resolver.probe_runtime().await.is_err());

        script(temp.path(), "fake-docker", "exit 0");
        assert!(resolver.probe_runtime().await.is_err());

        resolver.invalidate();
        assert!(resolver.probe_runtime().await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let temp = TempDir::new().unwrap();
        script(temp.path(), "fake-docker", "sleep 5");
        let resolver = resolver_in(&temp).with_probe_timeout(Duration::from_millis(200));

        let err = resolver.probe_runtime().await.unwrap_err();
        assert!(err.contains("did not answer"));
    }
}
