//! Shared data types.

pub mod job;
pub mod message;

pub use job::{Job, JobStatus};
pub use message::{Message, Role, ToolCall, ToolResult};
