//! The canonical response envelope
//!
//! Serialized as `{"status", "payload", "error_message"}`, with `warnings`
//! and `meta` added only when they carry something.

use crate::errors::ToolError;
use crate::types::execution::ExecutionMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
    Timeout,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseStatus::Success => "success",
            ResponseStatus::Error => "error",
            ResponseStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// A line of output that was skipped during normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// 1-based line number in stdout
    pub line: usize,
    pub message: String,
}

/// Execution details attached by the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<ExecutionMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Canonical result envelope returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub status: ResponseStatus,

    /// Tool output; verbatim when the source was well-formed structured data
    pub payload: serde_json::Value,

    /// Present only when status is not success
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ParseWarning>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

impl NormalizedResponse {
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            payload,
            error_message: None,
            warnings: Vec::new(),
            meta: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            payload: serde_json::Value::Null,
            error_message: Some(message.into()),
            warnings: Vec::new(),
            meta: None,
        }
    }

    pub fn timeout(message: impl Into<String>, partial: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Timeout,
            payload: partial,
            error_message: Some(message.into()),
            warnings: Vec::new(),
            meta: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<ParseWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Number of skipped lines
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl From<ToolError> for NormalizedResponse {
    fn from(err: ToolError) -> Self {
        let message = err.to_string();
        match err {
            ToolError::ExecutionTimeout { partial, .. } => {
                NormalizedResponse::timeout(message, partial)
            }
            ToolError::ExecutionFailed { partial, .. } => {
                NormalizedResponse::error(message).with_payload(partial)
            }
            _ => NormalizedResponse::error(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_serialization() {
        let resp = NormalizedResponse::success(json!({"a": 1}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            json!({"status": "success", "payload": {"a": 1}, "error_message": null})
        );
    }

    #[test]
    fn test_error_serialization_has_message() {
        let resp = NormalizedResponse::error("boom");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error_message"], "boom");
        assert!(value.get("warnings").is_none());
    }

    #[test]
    fn test_from_timeout_error_keeps_partial() {
        let err = ToolError::ExecutionTimeout {
            tool: "t".to_string(),
            timeout_secs: 1.0,
            stderr_excerpt: String::new(),
            partial: json!(["a.example.com"]),
        };
        let resp = NormalizedResponse::from(err);
        assert_eq!(resp.status, ResponseStatus::Timeout);
        assert_eq!(resp.payload, json!(["a.example.com"]));
        assert!(resp.error_message.unwrap().contains("timed out"));
    }

    #[test]
    fn test_from_config_error() {
        let resp = NormalizedResponse::from(ToolError::config("bad"));
        assert_eq!(resp.status, ResponseStatus::Error);
        assert_eq!(resp.payload, serde_json::Value::Null);
    }

    #[test]
    fn test_roundtrip_with_warnings() {
        let resp = NormalizedResponse::success(json!([1, 2])).with_warnings(vec![ParseWarning {
            line: 2,
            message: "bad line".to_string(),
        }]);
        let text = serde_json::to_string(&resp).unwrap();
        let back: NormalizedResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(back, resp);
        assert_eq!(back.warning_count(), 1);
    }
}
