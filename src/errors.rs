//! Error types for toolgate
//!
//! Every failure a tool invocation can hit maps to one variant here. The
//! runtime turns these into a `NormalizedResponse` at its boundary, so
//! callers of `ToolRuntime::invoke` never see them directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for tool resolution, execution and normalization
#[derive(Error, Debug)]
pub enum ToolError {
    /// Neither a host binary nor a container image could be resolved
    #[error("Tool '{tool}' is unavailable: {host_check}; {container_check}")]
    ToolUnavailable {
        tool: String,
        host_check: String,
        container_check: String,
    },

    /// Process exceeded its timeout budget and was terminated
    #[error("Tool '{tool}' timed out after {timeout_secs:.1}s{}", excerpt_suffix(.stderr_excerpt))]
    ExecutionTimeout {
        tool: String,
        timeout_secs: f64,
        stderr_excerpt: String,
        /// Leniently normalized partial stdout
        partial: serde_json::Value,
    },

    /// Nonzero exit (not covered by a no-results exception) or spawn failure
    #[error("Tool '{tool}' failed{}{}", exit_suffix(.exit_code), excerpt_suffix(.stderr_excerpt))]
    ExecutionFailed {
        tool: String,
        exit_code: Option<i32>,
        stderr_excerpt: String,
        /// Whatever stdout parsed to, if anything
        partial: serde_json::Value,
    },

    /// Stdout could not be interpreted under the declared output kind
    #[error("Failed to parse {kind} output from '{tool}': {reason}\n--- stdout ---\n{stdout_excerpt}\n--- stderr ---\n{stderr_excerpt}")]
    OutputParseError {
        tool: String,
        kind: String,
        reason: String,
        /// Head of stdout, capped like the stderr excerpt
        stdout_excerpt: String,
        stderr_excerpt: String,
    },

    /// Invalid invocation parameters
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for toolgate operations
pub type Result<T> = std::result::Result<T, ToolError>;

/// Coarse error classification used by retry policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ToolUnavailable,
    ExecutionTimeout,
    ExecutionFailed,
    OutputParseError,
    ConfigurationError,
    Io,
}

impl ToolError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::ToolUnavailable { .. } => ErrorKind::ToolUnavailable,
            ToolError::ExecutionTimeout { .. } => ErrorKind::ExecutionTimeout,
            ToolError::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            ToolError::OutputParseError { .. } => ErrorKind::OutputParseError,
            ToolError::ConfigurationError(_) => ErrorKind::ConfigurationError,
            ToolError::Io(_) => ErrorKind::Io,
            ToolError::Serialization(_) => ErrorKind::OutputParseError,
        }
    }

    /// Shorthand for configuration errors
    pub fn config(msg: impl Into<String>) -> Self {
        ToolError::ConfigurationError(msg.into())
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {}", code),
        None => " without an exit code".to_string(),
    }
}

fn excerpt_suffix(excerpt: &str) -> String {
    if excerpt.trim().is_empty() {
        String::new()
    } else {
        format!("; stderr: {}", excerpt.trim())
    }
}

/// Keep the tail of `text`, at most `max_bytes` long, on a char boundary.
///
/// CLI tools tend to print the actual failure last, so the tail is the
/// useful part of stderr.
pub fn excerpt(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

/// Keep the head of `text`, at most `max_bytes` long, on a char boundary.
///
/// Parsers fail early, so the head of stdout shows what went wrong.
pub fn head_excerpt(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_names_both_checks() {
        let err = ToolError::ToolUnavailable {
            tool: "amass".to_string(),
            host_check: "no executable 'amass' on search path".to_string(),
            container_check: "no container image registered".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("amass"));
        assert!(msg.contains("search path"));
        assert!(msg.contains("container image"));
        assert_eq!(err.kind(), ErrorKind::ToolUnavailable);
    }

    #[test]
    fn test_execution_failed_display() {
        let err = ToolError::ExecutionFailed {
            tool: "nuclei".to_string(),
            exit_code: Some(2),
            stderr_excerpt: "flag provided but not defined: -json".to_string(),
            partial: serde_json::Value::Null,
        };
        let msg = err.to_string();
        assert!(msg.contains("nuclei"));
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("-json"));
    }

    #[test]
    fn test_timeout_display_without_stderr() {
        let err = ToolError::ExecutionTimeout {
            tool: "sleepy".to_string(),
            timeout_secs: 1.0,
            stderr_excerpt: String::new(),
            partial: serde_json::Value::Null,
        };
        assert_eq!(err.to_string(), "Tool 'sleepy' timed out after 1.0s");
    }

    #[test]
    fn test_parse_error_mentions_parse() {
        let err = ToolError::OutputParseError {
            tool: "echo".to_string(),
            kind: "json_object".to_string(),
            reason: "expected value at line 1 column 1".to_string(),
            stdout_excerpt: "not json".to_string(),
            stderr_excerpt: String::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("parse"));
        assert!(msg.contains("not json"));
    }

    #[test]
    fn test_excerpt_keeps_tail() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("0123456789", 4), "...6789");
        // multi-byte boundary
        let s = "ééééé";
        let e = excerpt(s, 3);
        assert!(e.starts_with("..."));
        assert!(e.ends_with('é'));
    }

    #[test]
    fn test_head_excerpt_keeps_head() {
        assert_eq!(head_excerpt("short", 10), "short");
        assert_eq!(head_excerpt("0123456789", 4), "0123...");
        let e = head_excerpt("ééééé", 3);
        assert_eq!(e, "é...");
    }
}
