//! Tool trait, registry, and dispatch categories.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::models::message::ToolResult;

/// Tools that never modify state; failures may be retried
pub const READ_ONLY_TOOLS: &[&str] = &[
    "Read",
    "Glob",
    "Grep",
    "ListDir",
    "GitStatus",
    "GitDiff",
    "GitLog",
    "WebSearch",
    "WebFetch",
    "NotebookRead",
    "TodoWrite",
    "AskUserQuestion",
    "Math",
];

/// Tools that mutate files, processes, or remote state; invoked exactly once
pub const MUTATING_TOOLS: &[&str] = &[
    "Write",
    "Edit",
    "Insert",
    "DeleteFile",
    "MoveFile",
    "CopyFile",
    "MakeDir",
    "Bash",
    "GitCommit",
    "GitPush",
    "GitBranch",
    "GitCreatePR",
    "NotebookEdit",
    "NotebookExecute",
    "NotebookCreate",
];

/// How the dispatcher treats a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    /// Safe to retry through the recovery engine
    ReadOnly,
    /// Re-invoking risks duplicate or corrupted effects; one attempt only
    Mutating,
    /// Needs exclusive access to user input; never runs alongside others
    Interactive,
}

/// Categorize a tool by name.
///
/// Names absent from both lists take the read-only path, so unclassified
/// third-party tools are treated as retryable.
pub fn tool_category(name: &str) -> ToolCategory {
    if name == "AskUserQuestion" {
        ToolCategory::Interactive
    } else if MUTATING_TOOLS.contains(&name) {
        ToolCategory::Mutating
    } else {
        ToolCategory::ReadOnly
    }
}

/// Schema offered to the completion backend for native tool calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Trait implemented by every tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, as the model addresses it
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters
    fn parameters_schema(&self) -> Value;

    /// Run the tool.
    ///
    /// `Err` means the invocation itself failed and is subject to
    /// classification and retry. `Ok` with `success = false` is a
    /// tool-reported failure that goes back to the model as-is.
    async fn execute(&self, params: Value) -> Result<ToolResult>;
}

/// Registry of available tools
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!(tool = %name, "Registering tool");
        self.tools.write().await.insert(name, tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for every registered tool, sorted by name
    pub async fn schemas(&self) -> Vec<ToolSchema> {
        let tools = self.tools.read().await;
        let mut schemas: Vec<ToolSchema> = tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Execute a tool by name.
    ///
    /// An unknown name is a failed result, not an error: there is nothing
    /// to retry and the model needs the message.
    pub async fn execute(&self, name: &str, params: Value) -> Result<ToolResult> {
        let Some(tool) = self.get(name).await else {
            return Ok(ToolResult::error(format!("Tool '{}' not found", name)));
        };
        tool.execute(params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "Echo"
        }

        fn description(&self) -> &str {
            "Echoes back the text parameter"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"}
                },
                "required": ["text"]
            })
        }

        async fn execute(&self, params: Value) -> Result<ToolResult> {
            let text = params["text"].as_str().unwrap_or_default();
            Ok(ToolResult::ok(text))
        }
    }

    #[tokio::test]
    async fn register_and_execute() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await;

        let result = registry.execute("Echo", json!({"text": "hi"})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_result() {
        let registry = ToolRegistry::new();
        let result = registry.execute("Nope", json!({})).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool 'Nope' not found"));
    }

    #[tokio::test]
    async fn schemas_are_sorted_by_name() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await;
        let schemas = registry.schemas().await;
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "Echo");
        assert!(schemas[0].input_schema["properties"]["text"].is_object());
    }

    #[test]
    fn category_partition() {
        assert_eq!(tool_category("Read"), ToolCategory::ReadOnly);
        assert_eq!(tool_category("GitLog"), ToolCategory::ReadOnly);
        assert_eq!(tool_category("Write"), ToolCategory::Mutating);
        assert_eq!(tool_category("Bash"), ToolCategory::Mutating);
        assert_eq!(tool_category("AskUserQuestion"), ToolCategory::Interactive);
    }

    #[test]
    fn unknown_names_default_to_read_only() {
        assert_eq!(tool_category("SomePluginTool"), ToolCategory::ReadOnly);
    }

    #[test]
    fn listed_read_only_names_classify_read_only() {
        for name in READ_ONLY_TOOLS {
            if *name == "AskUserQuestion" {
                continue;
            }
            assert_eq!(tool_category(name), ToolCategory::ReadOnly);
        }
        for name in MUTATING_TOOLS {
            assert_eq!(tool_category(name), ToolCategory::Mutating);
        }
    }
}
