//! Tool execution system
//!
//! - versioned tool profiles (registry)
//! - process execution with hard timeouts (process, executor)
//! - retry policy with exponential backoff
//! - per-mount serialization (locks)
//! - tool runtime coordinator

pub mod types;
pub mod registry;
pub mod process;
pub mod executor;
pub mod retry;
pub mod locks;
pub mod runtime;

// Re-export commonly used types
pub use types::{MountSpec, ToolRequest, ToolStats};
pub use registry::{ToolProfile, ToolRegistry};
pub use process::CaptureLimits;
pub use executor::Executor;
pub use retry::RetryPolicy;
pub use locks::MountLocks;
pub use runtime::ToolRuntime;
