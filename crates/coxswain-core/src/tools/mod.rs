//! Tool registration and categorization.

pub mod registry;

pub use registry::{tool_category, Tool, ToolCategory, ToolRegistry, ToolSchema};
