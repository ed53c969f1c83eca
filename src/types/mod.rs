//! Type definitions module
//!
//! Per-invocation data: what to run, what came back, and the envelope
//! handed to callers.

pub mod invocation;
pub mod execution;
pub mod response;

// Re-export commonly used types
pub use invocation::{InvocationBuilder, ToolInvocation};
pub use execution::{ExecutionMethod, ExecutionResult, ExecutionTarget};
pub use response::{NormalizedResponse, ParseWarning, ResponseMeta, ResponseStatus};
