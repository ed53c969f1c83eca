//! Tool registry with versioned profiles
//!
//! Flags differ between releases of the same tool, so argument lists live in
//! profiles keyed by (name, version) instead of in code.
//!
//! Built-in profiles:
//! - subfinder: passive subdomain enumeration, one host per line
//! - amass: subdomain enumeration with addresses, host + address per line
//! - nuclei: template scanner, NDJSON findings
//! - httpx: HTTP prober, NDJSON results

use crate::errors::{Result, ToolError};
use crate::estimate::TimeoutEstimate;
use crate::normalize::{LineMode, OutputContract, OutputKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Everything toolgate knows about one version of one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProfile {
    /// Tool name used in requests
    pub name: String,

    /// Profile version, usually the tool release the flags were written for
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    /// Executable name on the host (defaults to `name`)
    #[serde(default)]
    pub binary: Option<String>,

    /// Container image used when no host binary exists
    #[serde(default)]
    pub image: Option<String>,

    /// Argument template; `{param}` is replaced from request params
    #[serde(default)]
    pub args: Vec<String>,

    pub output: OutputKind,

    #[serde(default)]
    pub no_results_exit_codes: Vec<i32>,

    /// Default timeout when neither the request nor an estimate sets one
    #[serde(default)]
    pub timeout_secs: Option<f64>,

    /// Workload-based timeout, applied when the request gives `workload_units`
    #[serde(default)]
    pub estimate: Option<TimeoutEstimate>,

    /// Serialize runs that share a host mount (file-backed tool databases)
    #[serde(default)]
    pub exclusive_mounts: bool,
}

fn default_version() -> String {
    "0".to_string()
}

impl ToolProfile {
    /// Create a profile with only the required fields set
    pub fn new(name: impl Into<String>, output: OutputKind) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            description: String::new(),
            binary: None,
            image: None,
            args: Vec::new(),
            output,
            no_results_exit_codes: Vec::new(),
            timeout_secs: None,
            estimate: None,
            exclusive_mounts: false,
        }
    }

    pub fn binary_name(&self) -> &str {
        self.binary.as_deref().unwrap_or(&self.name)
    }

    pub fn contract(&self) -> OutputContract {
        OutputContract::new(self.output.clone())
            .with_no_results_exit_codes(self.no_results_exit_codes.clone())
    }

    /// Expand the argument template with `params`
    ///
    /// A template entry that expands to an empty string is dropped, which
    /// lets optional flags be written as a single `{param}` entry.
    pub fn expand_args(&self, params: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let mut expanded = Vec::with_capacity(self.args.len());
        for template in &self.args {
            let arg = expand_template(template, params).map_err(|missing| {
                ToolError::config(format!(
                    "profile {}@{} needs parameter '{}'",
                    self.name, self.version, missing
                ))
            })?;
            if !(arg.is_empty() && !template.is_empty()) {
                expanded.push(arg);
            }
        }
        Ok(expanded)
    }

    /// Reject profiles that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ToolError::config("profile name cannot be empty"));
        }
        if let Some(timeout) = self.timeout_secs {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(ToolError::config(format!(
                    "profile {}: timeout_secs must be positive",
                    self.name
                )));
            }
        }
        if let Some(estimate) = &self.estimate {
            estimate.estimate_secs().map_err(|e| {
                ToolError::config(format!("profile {}: invalid estimate: {}", self.name, e))
            })?;
        }
        for template in &self.args {
            placeholders(template).map_err(|e| {
                ToolError::config(format!("profile {}: {}", self.name, e))
            })?;
        }
        Ok(())
    }
}

/// Names of all `{param}` placeholders in a template
fn placeholders(template: &str) -> std::result::Result<Vec<String>, String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| format!("unclosed '{{' in argument '{}'", template))?;
        let name = &after[..close];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid placeholder '{{{}}}' in '{}'", name, template));
        }
        names.push(name.to_string());
        rest = &after[close + 1..];
    }
    Ok(names)
}

/// Replace placeholders; `Err` names the first missing parameter
fn expand_template(
    template: &str,
    params: &BTreeMap<String, String>,
) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let name = &after[..close];
        let value = params.get(name).ok_or_else(|| name.to_string())?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Compare dotted versions numerically, falling back to text per component
fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.trim_start_matches('v').split('.');
    let mut right = b.trim_start_matches('v').split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Tool registry
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    /// Tool name → profiles sorted by ascending version
    tools: HashMap<String, Vec<ToolProfile>>,
}

impl ToolRegistry {
    /// Create registry with the built-in profiles
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register_subfinder();
        registry.register_amass();
        registry.register_nuclei();
        registry.register_httpx();

        registry
    }

    /// Registry with no profiles
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Add a profile, replacing any with the same name and version
    pub fn register(&mut self, profile: ToolProfile) -> Result<()> {
        profile.validate()?;
        let versions = self.tools.entry(profile.name.clone()).or_default();
        versions.retain(|p| p.version != profile.version);
        versions.push(profile);
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(())
    }

    fn register_builtin(&mut self, profile: ToolProfile) {
        // built-ins are static data covered by tests
        let versions = self.tools.entry(profile.name.clone()).or_default();
        versions.push(profile);
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
    }

    /// Register subfinder
    fn register_subfinder(&mut self) {
        self.register_builtin(ToolProfile {
            version: "2.6".to_string(),
            description: "Passive subdomain enumeration".to_string(),
            image: Some("projectdiscovery/subfinder:latest".to_string()),
            args: vec!["-silent".into(), "-d".into(), "{target}".into()],
            timeout_secs: Some(600.0),
            ..ToolProfile::new("subfinder", OutputKind::lines(LineMode::Single))
        });
    }

    /// Register amass
    fn register_amass(&mut self) {
        self.register_builtin(ToolProfile {
            version: "3.19".to_string(),
            description: "Subdomain enumeration with resolved addresses".to_string(),
            image: Some("caffix/amass:v3.19.3".to_string()),
            args: vec![
                "enum".into(),
                "-passive".into(),
                "-ip".into(),
                "-d".into(),
                "{target}".into(),
            ],
            timeout_secs: Some(1800.0),
            exclusive_mounts: true,
            ..ToolProfile::new(
                "amass",
                OutputKind::lines(LineMode::Pair {
                    first_key: "host".to_string(),
                    second_key: "addresses".to_string(),
                }),
            )
        });
        // v4 dropped `-ip` from passive mode
        self.register_builtin(ToolProfile {
            version: "4.2".to_string(),
            description: "Subdomain enumeration".to_string(),
            image: Some("caffix/amass:v4.2.0".to_string()),
            args: vec!["enum".into(), "-passive".into(), "-d".into(), "{target}".into()],
            timeout_secs: Some(1800.0),
            exclusive_mounts: true,
            ..ToolProfile::new("amass", OutputKind::lines(LineMode::Single))
        });
    }

    /// Register nuclei
    fn register_nuclei(&mut self) {
        self.register_builtin(ToolProfile {
            version: "3.1".to_string(),
            description: "Template-based vulnerability scanner".to_string(),
            image: Some("projectdiscovery/nuclei:latest".to_string()),
            args: vec![
                "-silent".into(),
                "-jsonl".into(),
                "-u".into(),
                "{target}".into(),
            ],
            timeout_secs: Some(3600.0),
            ..ToolProfile::new("nuclei", OutputKind::Ndjson)
        });
    }

    /// Register httpx
    fn register_httpx(&mut self) {
        self.register_builtin(ToolProfile {
            version: "1.3".to_string(),
            description: "HTTP probing of hosts".to_string(),
            image: Some("projectdiscovery/httpx:latest".to_string()),
            args: vec![
                "-silent".into(),
                "-json".into(),
                "-timeout".into(),
                "10".into(),
                "-threads".into(),
                "50".into(),
                "-retries".into(),
                "2".into(),
                "-u".into(),
                "{target}".into(),
            ],
            estimate: Some(TimeoutEstimate {
                per_unit_timeout_secs: 10,
                units: 1,
                concurrency: 50,
                retries: 2,
                buffer_secs: 60,
                max_secs: 3600,
            }),
            ..ToolProfile::new("httpx", OutputKind::Ndjson)
        });
    }

    /// Look up a profile; `None` version picks the highest registered one
    pub fn get(&self, name: &str, version: Option<&str>) -> Option<&ToolProfile> {
        let versions = self.tools.get(name)?;
        match version {
            Some(v) => versions.iter().find(|p| p.version == v),
            None => versions.last(),
        }
    }

    /// Check if any version of a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered versions of a tool, ascending
    pub fn versions(&self, name: &str) -> Vec<String> {
        self.tools
            .get(name)
            .map(|v| v.iter().map(|p| p.version.clone()).collect())
            .unwrap_or_default()
    }

    /// Get all tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Latest profile of every tool, sorted by name
    pub fn latest_profiles(&self) -> Vec<&ToolProfile> {
        self.tool_names()
            .iter()
            .filter_map(|name| self.get(name, None))
            .collect()
    }

    /// Images for the latest profile of each tool that has one
    pub fn images(&self) -> HashMap<String, String> {
        self.latest_profiles()
            .into_iter()
            .filter_map(|p| p.image.clone().map(|image| (p.name.clone(), image)))
            .collect()
    }

    /// Host binary names that differ from the tool name
    pub fn binaries(&self) -> HashMap<String, String> {
        self.latest_profiles()
            .into_iter()
            .filter_map(|p| p.binary.clone().map(|binary| (p.name.clone(), binary)))
            .collect()
    }

    /// Get number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
