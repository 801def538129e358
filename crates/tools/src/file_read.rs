//! File read tools. List and read files in the active project folder.

use async_trait::async_trait;
use inkloop_core::error::ToolError;
use inkloop_core::tool::{Tool, ToolContext, ToolResult};

use crate::project::{NO_ACTIVE_PROJECT, resolve_project_file};

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "Lists all files in the active project folder. Use this to see what files are available to edit."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let Some(folder) = ctx.active_project() else {
            return Ok(ToolResult::failure(NO_ACTIVE_PROJECT));
        };
        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut entries = match tokio::fs::read_dir(&folder).await {
            Ok(entries) => entries,
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "Error listing files in '{}': {e}",
                    folder.display()
                )));
            }
        };

        let mut files = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let Ok(meta) = entry.metadata().await else {
                        continue;
                    };
                    if meta.is_file() {
                        files.push((entry.file_name().to_string_lossy().into_owned(), meta.len()));
                    }
                }
                Ok(None) => break,
                Err(e) => return Ok(ToolResult::failure(format!("Error listing files: {e}"))),
            }
        }

        if files.is_empty() {
            return Ok(ToolResult::ok(format!(
                "Project folder '{folder_name}' is empty (no files)."
            )));
        }

        files.sort();
        let listing = files
            .iter()
            .map(|(name, size)| format!("  - {name} ({size} bytes)"))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolResult::ok(format!(
            "Files in project folder '{folder_name}':\n{listing}"
        )))
    }
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads the content of a file from the active project folder. \
         ALWAYS read a file before editing it to see its current content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "The name of the file to read"
                }
            },
            "required": ["filename"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let filename = arguments["filename"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'filename' argument".into()))?;

        let (path, filename) = match resolve_project_file(ctx, filename) {
            Ok(resolved) => resolved,
            Err(message) => return Ok(ToolResult::failure(message)),
        };

        if !path.is_file() {
            return Ok(ToolResult::failure(format!(
                "Error: File '{filename}' does not exist in the active project folder."
            )));
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::ok(content)),
            Err(e) => Ok(ToolResult::failure(format!(
                "Error reading file '{filename}': {e}"
            ))),
        }
    }
}
