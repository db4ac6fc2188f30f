//! Runtime configuration.
//!
//! Every field has a default, so partial TOML files and plain
//! `AgentConfig::default()` construction both work.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::tracker::{DEFAULT_FAILURE_LIMIT, DEFAULT_MAX_RETRIES};
use crate::context::compressor::DEFAULT_KEEP_RECENT;
use crate::context::manager::{DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_MAX_TOKENS};

/// Completion backend settings, passed through to client implementations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Model identifier understood by the backend
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Generation cap; None leaves it to the backend
    pub max_tokens: Option<u32>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "local-model".to_string(),
            temperature: 0.7,
            max_tokens: None,
            request_timeout_secs: 120,
        }
    }
}

/// Agent loop behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Loop iterations before the task is cut short
    pub max_iterations: u32,
    /// Wall-clock budget for one run() call; None means unbounded
    pub task_timeout_secs: Option<u64>,
    /// Stream completion text when no tool schemas are offered
    pub streaming: bool,
    /// Fan out independent tool calls concurrently
    pub parallel_tool_calls: bool,
    /// Text-marker tool calling for backends without native support
    pub fallback_mode: bool,
    /// Estimated context size the transcript is allowed to approach
    pub context_max_tokens: usize,
    /// Fraction of context_max_tokens that triggers compression
    pub context_compression_threshold: f64,
    /// Messages kept verbatim when compressing
    pub keep_recent_messages: usize,
    /// Attempts allowed per identical tool call before it is blocked
    pub max_tool_retries: u32,
    /// Consecutive tool failures before the circuit breaker trips
    pub failure_limit: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            task_timeout_secs: None,
            streaming: false,
            parallel_tool_calls: true,
            fallback_mode: false,
            context_max_tokens: DEFAULT_MAX_TOKENS,
            context_compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            keep_recent_messages: DEFAULT_KEEP_RECENT,
            max_tool_retries: DEFAULT_MAX_RETRIES,
            failure_limit: DEFAULT_FAILURE_LIMIT,
        }
    }
}

/// Side-channel storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; None falls back to the user data directory
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(crate::storage::default_db_path)
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoxswainConfig {
    pub completion: CompletionConfig,
    pub agent: AgentConfig,
    pub storage: StorageConfig,
}

impl CoxswainConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        Ok(config)
    }
}
