//! Output kinds and their parsers
//!
//! A closed set of formats. Each variant owns its parser, so adding a
//! format means adding a variant and the compiler points at every match
//! that needs updating.

use crate::errors::{Result, ToolError};
use crate::types::ParseWarning;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// How one line of `line_text` output is split
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "split", rename_all = "snake_case")]
pub enum LineMode {
    /// One value per line, e.g. one hostname
    #[default]
    Single,

    /// First two whitespace-delimited tokens, e.g. hostname and address
    Pair {
        #[serde(default = "default_first_key")]
        first_key: String,
        #[serde(default = "default_second_key")]
        second_key: String,
    },
}

fn default_first_key() -> String {
    "name".to_string()
}

fn default_second_key() -> String {
    "address".to_string()
}

impl LineMode {
    /// Pair mode with the default `name` / `address` keys
    pub fn pair() -> Self {
        LineMode::Pair {
            first_key: default_first_key(),
            second_key: default_second_key(),
        }
    }
}

/// Declared format of a tool's stdout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputKind {
    /// A single JSON value
    JsonObject,

    /// One JSON value per line
    Ndjson,

    /// Plain text, split per line
    LineText {
        #[serde(default)]
        mode: LineMode,
    },
}

/// Parsed stdout plus the lines that were skipped
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub payload: Value,
    pub warnings: Vec<ParseWarning>,
}

impl OutputKind {
    pub fn lines(mode: LineMode) -> Self {
        OutputKind::LineText { mode }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputKind::JsonObject => "json_object",
            OutputKind::Ndjson => "ndjson",
            OutputKind::LineText { .. } => "line_text",
        }
    }

    /// Payload used when a tool legitimately printed nothing
    pub fn empty_payload(&self) -> Value {
        match self {
            OutputKind::JsonObject => Value::Null,
            OutputKind::Ndjson | OutputKind::LineText { .. } => Value::Array(Vec::new()),
        }
    }

    /// Parse stdout under this kind
    ///
    /// `Err` carries the reason only; the normalizer wraps it with the tool
    /// name and raw streams.
    pub fn parse(&self, stdout: &str) -> std::result::Result<Parsed, String> {
        match self {
            OutputKind::JsonObject => parse_json_object(stdout),
            OutputKind::Ndjson => parse_ndjson(stdout),
            OutputKind::LineText { mode } => Ok(parse_lines(stdout, mode)),
        }
    }

    /// Best-effort parse for partial or failed runs; never fails
    ///
    /// Unparseable non-blank output is kept as a JSON string.
    pub fn parse_lenient(&self, stdout: &str) -> Value {
        if stdout.trim().is_empty() {
            return self.empty_payload();
        }
        match self.parse(stdout) {
            Ok(parsed) => parsed.payload,
            Err(_) => Value::String(stdout.to_string()),
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputKind {
    type Err = ToolError;

    /// Short names accepted on the command line
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" | "json_object" => Ok(OutputKind::JsonObject),
            "ndjson" | "jsonl" => Ok(OutputKind::Ndjson),
            "lines" | "line_text" => Ok(OutputKind::lines(LineMode::Single)),
            "pairs" => Ok(OutputKind::lines(LineMode::pair())),
            other => Err(ToolError::config(format!(
                "unknown output kind '{}' (expected json, ndjson, lines or pairs)",
                other
            ))),
        }
    }
}

fn parse_json_object(stdout: &str) -> std::result::Result<Parsed, String> {
    if stdout.trim().is_empty() {
        return Err("empty output".to_string());
    }
    serde_json::from_str::<Value>(stdout)
        .map(|payload| Parsed {
            payload,
            warnings: Vec::new(),
        })
        .map_err(|e| e.to_string())
}

fn parse_ndjson(stdout: &str) -> std::result::Result<Parsed, String> {
    let (payload, warnings, parsed_count) = parse_ndjson_lines(stdout);
    if parsed_count == 0 && !warnings.is_empty() {
        return Err(format!(
            "none of {} non-blank lines is valid JSON",
            warnings.len()
        ));
    }
    Ok(Parsed { payload, warnings })
}

fn parse_ndjson_lines(stdout: &str) -> (Value, Vec<ParseWarning>, usize) {
    let mut values = Vec::new();
    let mut warnings = Vec::new();

    for (index, line) in stdout.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => values.push(value),
            Err(e) => warnings.push(ParseWarning {
                line: index + 1,
                message: format!("invalid JSON: {}", e),
            }),
        }
    }

    let count = values.len();
    (Value::Array(values), warnings, count)
}

fn parse_lines(stdout: &str, mode: &LineMode) -> Parsed {
    let mut values = Vec::new();
    let mut warnings = Vec::new();

    for (index, line) in stdout.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match mode {
            LineMode::Single => values.push(Value::String(line.to_string())),
            LineMode::Pair {
                first_key,
                second_key,
            } => {
                let mut tokens = line.split_whitespace();
                let first = tokens.next().unwrap_or_default();
                let second = match tokens.next() {
                    Some(token) => Value::String(token.to_string()),
                    None => {
                        warnings.push(ParseWarning {
                            line: index + 1,
                            message: format!("missing '{}' field", second_key),
                        });
                        Value::Null
                    }
                };
                let mut entry = Map::new();
                entry.insert(first_key.clone(), Value::String(first.to_string()));
                entry.insert(second_key.clone(), second);
                values.push(Value::Object(entry));
            }
        }
    }

    Parsed {
        payload: Value::Array(values),
        warnings,
    }
}
