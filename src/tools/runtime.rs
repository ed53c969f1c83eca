//! Tool runtime coordinator
//!
//! The boundary of the crate: a `ToolRequest` goes in, a
//! `NormalizedResponse` comes out, and no error escapes.
//!
//! # Flow
//! 1. Look up the profile (optional) and build a validated `ToolInvocation`
//! 2. Take mount locks if the profile asks for them
//! 3. Under the retry policy: resolve → execute → normalize
//! 4. Attach `ResponseMeta` and update stats

use crate::config::Config;
use crate::errors::{Result, ToolError};
use crate::normalize::{Normalizer, OutputContract};
use crate::resolver::Resolver;
use crate::tools::executor::{absolute_host_path, Executor};
use crate::tools::locks::MountLocks;
use crate::tools::process::CaptureLimits;
use crate::tools::registry::{ToolProfile, ToolRegistry};
use crate::tools::retry::RetryPolicy;
use crate::tools::types::{MountSpec, ToolRequest, ToolStats};
use crate::types::{
    ExecutionMethod, ExecutionResult, NormalizedResponse, ResponseMeta, ResponseStatus,
    ToolInvocation,
};
use chrono::Utc;
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything needed to run one request, decided before the first attempt
#[derive(Debug)]
struct Plan {
    invocation: ToolInvocation,
    contract: OutputContract,
    binary: String,
    image: Option<String>,
    exclusive_mounts: bool,
}

/// What the last attempt's process looked like, for `ResponseMeta`
#[derive(Debug, Clone, Copy)]
struct LastRun {
    method: ExecutionMethod,
    exit_code: Option<i32>,
    truncated: bool,
}

impl From<&ExecutionResult> for LastRun {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            method: result.execution_method,
            exit_code: result.exit_code,
            truncated: result.truncated,
        }
    }
}

/// Tool runtime coordinator
pub struct ToolRuntime {
    registry: ToolRegistry,
    resolver: Arc<Resolver>,
    executor: Executor,
    normalizer: Normalizer,
    retry: RetryPolicy,
    locks: MountLocks,
    default_timeout_secs: f64,
    default_network: Option<String>,
    stats: Mutex<ToolStats>,
}

impl ToolRuntime {
    /// Runtime over `registry`, with a resolver that knows the registry's
    /// images and binary names
    pub fn new(registry: ToolRegistry) -> Self {
        let resolver = Resolver::default()
            .with_images(registry.images())
            .with_binaries(registry.binaries());
        Self::with_resolver(registry, Arc::new(resolver))
    }

    /// Runtime sharing a caller-owned resolver
    pub fn with_resolver(registry: ToolRegistry, resolver: Arc<Resolver>) -> Self {
        Self {
            registry,
            resolver,
            executor: Executor::default(),
            normalizer: Normalizer::default(),
            retry: RetryPolicy::default(),
            locks: MountLocks::new(),
            default_timeout_secs: crate::types::InvocationBuilder::DEFAULT_TIMEOUT_SECS,
            default_network: None,
            stats: Mutex::new(ToolStats::default()),
        }
    }

    /// Build the runtime described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut registry = ToolRegistry::new();
        for profile in &config.profiles {
            registry.register(profile.clone())?;
        }

        let mut resolver = Resolver::new(config.container.runtime.clone())
            .with_probe_timeout(Duration::from_secs_f64(config.container.probe_timeout_secs))
            .with_images(registry.images())
            .with_binaries(registry.binaries());
        if let Some(path) = &config.execution.search_path {
            resolver = resolver.with_search_path(path);
        }

        let capture = CaptureLimits {
            max_output_bytes: config.execution.max_output_bytes,
            drain_grace: Duration::from_millis(config.execution.drain_grace_ms),
        };

        let mut runtime = Self::with_resolver(registry, Arc::new(resolver))
            .with_executor(Executor::new(config.execution.max_parallel, capture))
            .with_normalizer(Normalizer::new(config.execution.stderr_excerpt_bytes))
            .with_retry_policy(config.retry.clone())
            .with_default_timeout_secs(config.execution.default_timeout_secs);
        runtime.default_network = config.container.network.clone();
        Ok(runtime)
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_timeout_secs(mut self, secs: f64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Snapshot of the execution counters
    pub fn stats(&self) -> ToolStats {
        self.lock_stats().clone()
    }

    /// Run one request
    pub async fn invoke(&self, request: ToolRequest) -> NormalizedResponse {
        let started_at = Utc::now();
        let start = Instant::now();
        let tool = request.tool.clone();

        let plan = match self.plan(&request) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(tool = %tool, error = %e, "Rejected tool request");
                let response = NormalizedResponse::from(e);
                return self.finish(&tool, response, None, 0, start, started_at);
            }
        };

        let _mount_guard = if plan.exclusive_mounts {
            let paths = plan.invocation.volume_mounts().keys().map(PathBuf::as_path);
            Some(self.locks.acquire(&tool, paths).await)
        } else {
            None
        };

        let last_run = Mutex::new(None);
        let attempted = self
            .retry
            .execute_with_retry(&tool, || self.attempt(&plan, &last_run))
            .await;

        let response = match attempted.result {
            Ok(response) => response,
            Err(e) => NormalizedResponse::from(e),
        };
        let last_run = last_run
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.finish(&tool, response, last_run, attempted.attempts, start, started_at)
    }

    /// Run the core pipeline for an already built invocation
    ///
    /// No profile, no retry, no envelope: errors are returned as-is.
    pub async fn run(
        &self,
        invocation: &ToolInvocation,
        contract: &OutputContract,
    ) -> Result<NormalizedResponse> {
        let target = self.resolver.resolve(invocation.tool_name()).await?;
        let result = self.executor.execute(invocation, &target).await?;
        self.normalizer
            .normalize(invocation.tool_name(), &result, contract)
    }

    /// Run several requests concurrently, responses in request order
    ///
    /// Concurrency is bounded by the executor's parallelism limit.
    pub async fn invoke_all(&self, requests: Vec<ToolRequest>) -> Vec<NormalizedResponse> {
        join_all(requests.into_iter().map(|request| self.invoke(request))).await
    }

    async fn attempt(&self, plan: &Plan, last_run: &Mutex<Option<LastRun>>) -> Result<NormalizedResponse> {
        let tool = plan.invocation.tool_name();
        let target = self
            .resolver
            .resolve_with(tool, &plan.binary, plan.image.as_deref())
            .await?;

        let result = match self.executor.execute(&plan.invocation, &target).await {
            Ok(result) => result,
            Err(e) => {
                // the binary may have moved; re-resolve on the next attempt
                self.resolver.invalidate_tool(tool);
                return Err(e);
            }
        };

        debug!(
            tool,
            method = %result.execution_method,
            exit_code = ?result.exit_code,
            elapsed_secs = result.wall_clock_seconds,
            timed_out = result.timed_out,
            "Tool process finished"
        );
        *last_run.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(LastRun::from(&result));

        self.normalizer.normalize(tool, &result, &plan.contract)
    }

    fn plan(&self, request: &ToolRequest) -> Result<Plan> {
        let profile = self.profile_for(request)?;

        let mut args = match profile {
            Some(profile) => profile.expand_args(&request.params)?,
            None => Vec::new(),
        };
        args.extend(request.args.iter().cloned());

        let kind = request
            .output
            .clone()
            .or_else(|| profile.map(|p| p.output.clone()))
            .ok_or_else(|| {
                ToolError::config(format!(
                    "no profile registered for '{}'; the request must declare an output kind",
                    request.tool
                ))
            })?;
        let no_results = profile
            .map(|p| p.no_results_exit_codes.clone())
            .unwrap_or_default();
        let contract = OutputContract::new(kind).with_no_results_exit_codes(no_results);

        let mut builder = ToolInvocation::builder(request.tool.clone())
            .args(args)
            .timeout_secs(self.timeout_secs(request, profile)?);
        if let Some(dir) = &request.working_dir {
            builder = builder.working_directory(dir.clone());
        }
        for mount in &request.mounts {
            builder = builder.mount(mount_host(mount, request), mount.container.clone());
        }
        for (key, value) in &request.env {
            builder = builder.env(key.clone(), value.clone());
        }
        if let Some(network) = request.network.as_ref().or(self.default_network.as_ref()) {
            builder = builder.network(network.clone());
        }
        let invocation = builder.build()?;

        let binary = profile
            .map(|p| p.binary_name().to_string())
            .unwrap_or_else(|| request.tool.clone());
        let image = match profile {
            Some(profile) => profile.image.clone(),
            None => self.resolver.image_for(&request.tool).map(str::to_string),
        };

        Ok(Plan {
            invocation,
            contract,
            binary,
            image,
            exclusive_mounts: profile.is_some_and(|p| p.exclusive_mounts),
        })
    }

    fn profile_for(&self, request: &ToolRequest) -> Result<Option<&ToolProfile>> {
        match request.version.as_deref() {
            Some(version) => self
                .registry
                .get(&request.tool, Some(version))
                .map(Some)
                .ok_or_else(|| {
                    ToolError::config(format!(
                        "no profile {}@{} (known versions: {})",
                        request.tool,
                        version,
                        self.registry.versions(&request.tool).join(", ")
                    ))
                }),
            None => Ok(self.registry.get(&request.tool, None)),
        }
    }

    /// Request timeout, then request estimate, then profile estimate for the
    /// requested workload, then profile timeout, then the configured default
    fn timeout_secs(&self, request: &ToolRequest, profile: Option<&ToolProfile>) -> Result<f64> {
        if let Some(secs) = request.timeout_secs {
            return Ok(secs);
        }

        if let Some(estimate) = request.estimate {
            let estimate = match request.workload_units {
                Some(units) => estimate.with_units(units),
                None => estimate,
            };
            return Ok(estimate.estimate_secs()? as f64);
        }

        if let Some(profile) = profile {
            if let Some(estimate) = profile.estimate {
                if let Some(units) = request.workload_units {
                    return Ok(estimate.with_units(units).estimate_secs()? as f64);
                }
                if profile.timeout_secs.is_none() {
                    return Ok(estimate.estimate_secs()? as f64);
                }
            }
            if let Some(secs) = profile.timeout_secs {
                return Ok(secs);
            }
        }

        Ok(self.default_timeout_secs)
    }

    fn finish(
        &self,
        tool: &str,
        mut response: NormalizedResponse,
        last_run: Option<LastRun>,
        attempts: u32,
        start: Instant,
        started_at: chrono::DateTime<Utc>,
    ) -> NormalizedResponse {
        let duration_ms = start.elapsed().as_millis() as u64;

        {
            let mut stats = self.lock_stats();
            match response.status {
                ResponseStatus::Success => stats.record_success(duration_ms),
                ResponseStatus::Timeout => stats.record_timeout(duration_ms),
                ResponseStatus::Error => stats.record_failure(duration_ms),
            }
            stats.record_retries(attempts.saturating_sub(1));
        }

        info!(
            tool,
            status = %response.status,
            duration_ms,
            attempts,
            warnings = response.warning_count(),
            "Tool invocation finished"
        );

        response.meta = Some(ResponseMeta {
            tool: tool.to_string(),
            method: last_run.map(|run| run.method),
            exit_code: last_run.and_then(|run| run.exit_code),
            duration_ms,
            attempts,
            started_at,
            truncated: last_run.is_some_and(|run| run.truncated),
        });
        response
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, ToolStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One spelling per host directory, so mount locks see `db` under `/work`
/// and `/work/db` as the same path
fn mount_host(mount: &MountSpec, request: &ToolRequest) -> PathBuf {
    let host = absolute_host_path(&mount.host, request.working_dir.as_deref());
    std::fs::canonicalize(&host).unwrap_or(host)
}
