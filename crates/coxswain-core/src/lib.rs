//! Agent execution core.
//!
//! Drives multi-turn, tool-augmented conversations against a pluggable
//! completion backend: the loop requests a completion, executes the tool
//! calls it carries, feeds results back, and repeats until the model
//! answers in plain text or a safety net ends the task.
//!
//! The safety nets operate at three scopes: the recovery engine retries a
//! single failing operation with classified backoff, the retry tracker
//! blocks the model from re-issuing the same call past its budget, and a
//! task-wide circuit breaker stops runs that keep failing. Long
//! transcripts are compressed in place so the loop never outgrows its
//! context window.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod models;
pub mod queue;
pub mod recovery;
pub mod storage;
pub mod tools;

pub use agent::hooks::{JobSink, MessageSink};
pub use agent::runner::{Agent, StopHandle};
pub use agent::tracker::{RetryTracker, TrackerStats};
pub use config::{AgentConfig, CompletionConfig, CoxswainConfig, StorageConfig};
pub use context::manager::{ContextManager, ContextStats};
pub use error::AgentError;
pub use llm::client::CompletionClient;
pub use models::job::{Job, JobStatus};
pub use models::message::{Message, Role, ToolCall, ToolResult};
pub use queue::sqlite::SqliteJobQueue;
pub use recovery::classifier::ErrorKind;
pub use storage::sessions::SessionStore;
pub use tools::registry::{Tool, ToolRegistry, ToolSchema};
