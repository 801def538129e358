//! Tool trait. The abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! create a project folder, read and write manuscript files, search the web.
//! Every invocation receives the session's [`ToolContext`] instead of
//! reaching for process-wide state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool did what was asked
    pub success: bool,

    /// The output content, shown verbatim to the model
    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    /// A handled failure. The text is still delivered to the model.
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Per-session state shared by every tool invocation.
///
/// Holds the output root under which project folders are created and the
/// currently active project folder.
#[derive(Debug)]
pub struct ToolContext {
    output_root: PathBuf,
    active_project: RwLock<Option<PathBuf>>,
}

impl ToolContext {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            active_project: RwLock::new(None),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// The active project folder, if one has been created or selected.
    pub fn active_project(&self) -> Option<PathBuf> {
        self.active_project
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn set_active_project(&self, folder: impl Into<PathBuf>) {
        let folder = folder.into();
        match self.active_project.write() {
            Ok(mut guard) => *guard = Some(folder),
            Err(poisoned) => *poisoned.into_inner() = Some(folder),
        }
    }

    /// Where checkpoints go: the active project, or the output root.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.active_project()
            .unwrap_or_else(|| self.output_root.clone())
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new("output")
    }
}

/// The core Tool trait.
///
/// Each tool (create_project, read_file, write_file, web_search, etc.)
/// implements this trait. Tools are registered in the ToolRegistry and made
/// available to the agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given (already decoded) arguments.
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up and execute tools when the LLM requests them
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool definitions (for sending to the LLM), ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
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

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            _ctx: &ToolContext,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::ok(text))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert!(registry.contains("echo"));
    }

    #[test]
    fn registry_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn registry_lookup_runs_the_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let ctx = ToolContext::default();
        let result = registry
            .get("echo")
            .unwrap()
            .execute(&ctx, serde_json::json!({"text": "hello world"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn checkpoint_dir_follows_active_project() {
        let ctx = ToolContext::new("/tmp/out");
        assert_eq!(ctx.checkpoint_dir(), PathBuf::from("/tmp/out"));

        ctx.set_active_project("/tmp/out/novel");
        assert_eq!(ctx.active_project(), Some(PathBuf::from("/tmp/out/novel")));
        assert_eq!(ctx.checkpoint_dir(), PathBuf::from("/tmp/out/novel"));
    }
}
