//! Output normalizer
//!
//! Turns an `ExecutionResult` into a `NormalizedResponse`:
//! - Timeouts become `ExecutionTimeout` with the partial stdout kept
//! - Nonzero exits become `ExecutionFailed` unless the tool declares the
//!   code as "no results"
//! - Stdout is parsed under the declared `OutputKind` and passed through
//!   verbatim when it is already structured

pub mod kind;

pub use kind::{LineMode, OutputKind, Parsed};

use crate::errors::{excerpt, head_excerpt, Result, ToolError};
use crate::types::{ExecutionResult, NormalizedResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default stderr excerpt size in error messages
pub const DEFAULT_STDERR_EXCERPT_BYTES: usize = 2048;

/// What a tool promises about its output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputContract {
    pub kind: OutputKind,

    /// Nonzero exit codes that mean "ran fine, found nothing"
    #[serde(default)]
    pub no_results_exit_codes: Vec<i32>,
}

impl OutputContract {
    pub fn new(kind: OutputKind) -> Self {
        Self {
            kind,
            no_results_exit_codes: Vec::new(),
        }
    }

    pub fn with_no_results_exit_codes(mut self, codes: impl Into<Vec<i32>>) -> Self {
        self.no_results_exit_codes = codes.into();
        self
    }

    fn is_no_results(&self, code: i32) -> bool {
        code != 0 && self.no_results_exit_codes.contains(&code)
    }
}

/// Output normalizer
#[derive(Debug, Clone)]
pub struct Normalizer {
    stderr_excerpt_bytes: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_STDERR_EXCERPT_BYTES)
    }
}

impl Normalizer {
    pub fn new(stderr_excerpt_bytes: usize) -> Self {
        Self {
            stderr_excerpt_bytes,
        }
    }

    /// Normalize one execution result
    ///
    /// Returns `Err` for every non-success outcome so the retry policy can
    /// inspect the error kind; `NormalizedResponse::from` turns it into the
    /// final envelope.
    pub fn normalize(
        &self,
        tool: &str,
        result: &ExecutionResult,
        contract: &OutputContract,
    ) -> Result<NormalizedResponse> {
        if result.timed_out {
            return Err(ToolError::ExecutionTimeout {
                tool: tool.to_string(),
                timeout_secs: result.timeout_secs.unwrap_or(result.wall_clock_seconds),
                stderr_excerpt: excerpt(&result.stderr, self.stderr_excerpt_bytes),
                partial: contract.kind.parse_lenient(&result.stdout),
            });
        }

        match result.exit_code {
            Some(0) => self.parse_success(tool, result, contract),
            Some(code) if contract.is_no_results(code) => {
                debug!(tool, code, "Exit code declared as no-results");
                if result.stdout.trim().is_empty() {
                    Ok(NormalizedResponse::success(contract.kind.empty_payload()))
                } else {
                    self.parse_success(tool, result, contract)
                }
            }
            exit_code => Err(ToolError::ExecutionFailed {
                tool: tool.to_string(),
                exit_code,
                stderr_excerpt: excerpt(&result.stderr, self.stderr_excerpt_bytes),
                partial: contract.kind.parse_lenient(&result.stdout),
            }),
        }
    }

    fn parse_success(
        &self,
        tool: &str,
        result: &ExecutionResult,
        contract: &OutputContract,
    ) -> Result<NormalizedResponse> {
        match contract.kind.parse(&result.stdout) {
            Ok(parsed) => {
                if !parsed.warnings.is_empty() {
                    warn!(
                        tool,
                        kind = %contract.kind,
                        skipped = parsed.warnings.len(),
                        "Skipped malformed output lines"
                    );
                }
                Ok(NormalizedResponse::success(parsed.payload).with_warnings(parsed.warnings))
            }
            Err(reason) => Err(ToolError::OutputParseError {
                tool: tool.to_string(),
                kind: contract.kind.name().to_string(),
                reason,
                stdout_excerpt: head_excerpt(&result.stdout, self.stderr_excerpt_bytes),
                stderr_excerpt: excerpt(&result.stderr, self.stderr_excerpt_bytes),
            }),
        }
    }
}
