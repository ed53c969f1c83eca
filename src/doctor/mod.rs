//! Doctor command for availability diagnostics
//!
//! Reports, for the container runtime and every registered tool profile,
//! whether toolgate could run it right now and how.

use crate::resolver::Resolver;
use crate::tools::registry::ToolRegistry;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,

    /// How the check passed, e.g. the resolved binary path
    pub detail: Option<String>,
}

impl HealthCheck {
    fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Doctor diagnostics system
pub struct Doctor {
    resolver: Arc<Resolver>,
    registry: ToolRegistry,
    working_dir: PathBuf,
}

impl Doctor {
    /// Create a new doctor instance
    pub fn new(resolver: Arc<Resolver>, registry: ToolRegistry, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            registry,
            working_dir: working_dir.into(),
        }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        // fresh probes, not what an earlier run cached
        self.resolver.invalidate();

        let mut checks = Vec::new();
        checks.push(self.check_runtime().await);
        checks.push(self.check_permissions());
        for name in self.registry.tool_names() {
            for version in self.registry.versions(&name) {
                checks.push(self.check_profile(&name, &version).await);
            }
        }
        checks
    }

    /// Container runtime reachable
    async fn check_runtime(&self) -> HealthCheck {
        let name = format!("Runtime ({})", self.resolver.runtime());
        match self.resolver.probe_runtime().await {
            Ok(path) => HealthCheck::new(name, HealthStatus::Pass).with_detail(path.display().to_string()),
            Err(reason) => HealthCheck::new(
                name,
                HealthStatus::Warn(format!("{}; only host binaries can run", reason)),
            ),
        }
    }

    /// Working directory exists and is writable
    fn check_permissions(&self) -> HealthCheck {
        let name = "Working directory";
        let dir: &Path = &self.working_dir;
        if !dir.is_dir() {
            return HealthCheck::new(
                name,
                HealthStatus::Fail(format!("{} does not exist", dir.display())),
            );
        }

        let probe = dir.join(".toolgate_write_test");
        match std::fs::write(&probe, "test") {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                HealthCheck::new(name, HealthStatus::Pass).with_detail(dir.display().to_string())
            }
            Err(_) => HealthCheck::new(
                name,
                HealthStatus::Warn("No write permission in working directory".to_string()),
            ),
        }
    }

    /// One profile: host binary, container, or neither
    async fn check_profile(&self, tool: &str, version: &str) -> HealthCheck {
        let name = format!("{}@{}", tool, version);
        let Some(profile) = self.registry.get(tool, Some(version)) else {
            return HealthCheck::new(name, HealthStatus::Fail("profile vanished".to_string()));
        };

        match self
            .resolver
            .resolve_with(tool, profile.binary_name(), profile.image.as_deref())
            .await
        {
            Ok(target) => HealthCheck::new(name, HealthStatus::Pass).with_detail(target.to_string()),
            Err(e) => HealthCheck::new(name, HealthStatus::Fail(e.to_string())),
        }
    }

    /// Display diagnostics results
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n{}\n", "toolgate diagnostics".bold());
        println!("{:<24} {}", "Check", "Status");
        println!("{}", "=".repeat(60));

        for check in checks {
            let status = match &check.status {
                HealthStatus::Pass => "PASS".green().to_string(),
                HealthStatus::Warn(msg) => format!("{} {}", "WARN".yellow(), msg),
                HealthStatus::Fail(msg) => format!("{} {}", "FAIL".red(), msg),
            };
            match &check.detail {
                Some(detail) => println!("{:<24} {} {}", check.name, status, detail.dimmed()),
                None => println!("{:<24} {}", check.name, status),
            }
        }

        println!();
    }

    /// Get overall health status
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks.iter().any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}


#[cfg(all(test, unix))]
mod unix_tests {
    use super::*;
    use crate::normalize::OutputKind;
    use crate::tools::registry::ToolProfile;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_diagnostics_per_profile() {
        let temp = TempDir::new().unwrap();
        script(temp.path(), "hosttool", "exit 0");
        script(temp.path(), "fake-docker", "exit 0");

        let mut registry = ToolRegistry::empty();
        registry
            .register(ToolProfile::new("hosttool", OutputKind::JsonObject))
            .unwrap();
        registry
            .register(ToolProfile {
                image: Some("example/boxed".to_string()),
                ..ToolProfile::new("boxed", OutputKind::Ndjson)
            })
            .unwrap();
        registry
            .register(ToolProfile::new("missing", OutputKind::Ndjson))
            .unwrap();

        let resolver = Resolver::new("fake-docker").with_search_path(temp.path().as_os_str());
        let doctor = Doctor::new(Arc::new(resolver), registry, temp.path());
        let checks = doctor.run_diagnostics().await;

        let status = |name: &str| {
            checks
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.status.clone())
                .unwrap()
        };
        assert_eq!(status("Runtime (fake-docker)"), HealthStatus::Pass);
        assert_eq!(status("Working directory"), HealthStatus::Pass);
        assert_eq!(status("hosttool@0"), HealthStatus::Pass);
        assert_eq!(status("boxed@0"), HealthStatus::Pass);
        assert!(matches!(status("missing@0"), HealthStatus::Fail(_)));
        assert!(!Doctor::overall_status(&checks));
    }
}
