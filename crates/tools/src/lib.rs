//! Built-in tool implementations for inkloop.
//!
//! Tools give the agent the ability to work on a manuscript project:
//! create or select a project folder, list, read and write its files,
//! and search the web for reference material.
//!
//! Every tool resolves paths through the session's `ToolContext`, so a tool
//! can never touch files outside the active project folder.

pub mod file_read;
pub mod file_write;
pub mod project;
pub mod web_search;

use inkloop_core::provider::ToolDefinition;
use inkloop_core::tool::ToolRegistry;

/// Reserved tool name. The agent loop intercepts it and compresses the
/// conversation; it is never looked up in the registry.
pub const COMPRESS_CONTEXT: &str = "compress_context";

/// Schema advertised to the model for the reserved compression tool.
pub fn compress_context_definition() -> ToolDefinition {
    ToolDefinition {
        name: COMPRESS_CONTEXT.into(),
        description: "INTERNAL TOOL - This is automatically called by the system when the \
                      token limit is approached. You should not call this manually. It \
                      compresses the conversation history to save tokens."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        }),
    }
}

/// Create a registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(project::CreateProjectTool));
    registry.register(Box::new(file_read::ListFilesTool));
    registry.register(Box::new(file_read::ReadFileTool));
    registry.register(Box::new(file_write::WriteFileTool));
    registry.register(Box::new(web_search::WebSearchTool::new()));
    registry
}
