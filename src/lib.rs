//! toolgate - tool dispatch for agent tool-calling layers
//!
//! Runs external command-line tools (Amass, Subfinder, Nuclei, httpx, ...)
//! and hands back one JSON envelope per call.
//!
//! # Architecture
//!
//! - **resolver**: host binary on the search path, else a container image
//! - **tools**: profiles, process execution under a hard timeout, retry,
//!   mount locks and the `ToolRuntime` boundary
//! - **normalize**: JSON object / NDJSON / line text into `NormalizedResponse`
//! - **estimate**: workload-sized timeouts

pub mod errors;
pub mod types;
pub mod estimate;
pub mod normalize;
pub mod resolver;
pub mod tools;

// Re-export commonly used types
pub use errors::{ErrorKind, Result, ToolError};
pub use types::{ExecutionResult, NormalizedResponse, ResponseStatus, ToolInvocation};
pub use tools::{ToolRequest, ToolRuntime};

// Configuration, diagnostics and CLI plumbing
pub mod config;
pub mod logging;
pub mod doctor;
pub mod cli;
