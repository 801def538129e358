//! File write tool. Create, append to, or overwrite project files.

use async_trait::async_trait;
use inkloop_core::error::ToolError;
use inkloop_core::tool::{Tool, ToolContext, ToolResult};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::project::resolve_project_file;

/// How `write_file` treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// New file only; fails if it exists
    Create,
    Append,
    Overwrite,
}

impl WriteMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "append" => Some(Self::Append),
            "overwrite" => Some(Self::Overwrite),
            _ => None,
        }
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes edited content to a markdown file in the active project folder. For editing \
         existing manuscript files, ALWAYS use 'overwrite' mode to edit them in place. Use \
         'create' only for new editorial notes and reports. Modes: 'create' (creates new file, \
         fails if exists), 'append' (adds content to end), 'overwrite' (replaces entire file \
         content - USE THIS for editing manuscripts)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "The name of the markdown file to write (should end in .md)"
                },
                "content": {
                    "type": "string",
                    "description": "The edited content to write to the file"
                },
                "mode": {
                    "type": "string",
                    "enum": ["create", "append", "overwrite"],
                    "description": "The write mode: 'create' for new files, 'append' to add to existing, 'overwrite' to replace"
                }
            },
            "required": ["filename", "content", "mode"]
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
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let mode_str = arguments["mode"].as_str().unwrap_or("create");

        let Some(mode) = WriteMode::parse(mode_str) else {
            return Ok(ToolResult::failure(format!(
                "Error: Invalid mode '{mode_str}'. Use 'create', 'append', or 'overwrite'."
            )));
        };

        let (path, filename) = match resolve_project_file(ctx, filename) {
            Ok(resolved) => resolved,
            Err(message) => return Ok(ToolResult::failure(message)),
        };

        if mode == WriteMode::Create && path.exists() {
            return Ok(ToolResult::failure(format!(
                "Error: File '{filename}' already exists. Use 'append' or 'overwrite' mode to modify it."
            )));
        }

        let mut options = tokio::fs::OpenOptions::new();
        match mode {
            WriteMode::Create => options.write(true).create_new(true),
            WriteMode::Append => options.append(true).create(true),
            WriteMode::Overwrite => options.write(true).create(true).truncate(true),
        };

        let written = async {
            let mut file = options.open(&path).await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            return Ok(ToolResult::failure(format!(
                "Error writing file '{filename}': {e}"
            )));
        }

        let chars = content.chars().count();
        debug!(file = %filename, ?mode, chars, "Wrote project file");

        let verb = match mode {
            WriteMode::Create => "Created",
            WriteMode::Append => "Appended to",
            WriteMode::Overwrite => "Overwrote",
        };
        Ok(ToolResult::ok(format!(
            "{verb} '{filename}' ({chars} characters)."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("book");
        std::fs::create_dir(&folder).unwrap();
        let ctx = ToolContext::new(dir.path());
        ctx.set_active_project(folder);
        (dir, ctx)
    }

    async fn write(ctx: &ToolContext, mode: &str, content: &str) -> ToolResult {
        WriteFileTool
            .execute(
                ctx,
                serde_json::json!({"filename": "notes", "content": content, "mode": mode}),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_append_overwrite() {
        let (dir, ctx) = project();
        let path = dir.path().join("book/notes.md");

        assert!(write(&ctx, "create", "one").await.success);
        assert!(write(&ctx, "append", " two").await.success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one two");

        let again = write(&ctx, "create", "three").await;
        assert!(!again.success);
        assert!(again.output.contains("already exists"));

        assert!(write(&ctx, "overwrite", "final").await.success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "final");
    }

    #[tokio::test]
    async fn invalid_mode_is_reported() {
        let (_dir, ctx) = project();
        let result = write(&ctx, "replace", "x").await;
        assert!(!result.success);
        assert!(result.output.contains("Invalid mode"));
    }

    #[tokio::test]
    async fn write_without_project() {
        let ctx = ToolContext::default();
        let result = write(&ctx, "create", "x").await;
        assert!(result.output.starts_with("Error: No active project folder"));
    }

    #[tokio::test]
    async fn missing_content_is_invalid_arguments() {
        let (_dir, ctx) = project();
        let err = WriteFileTool
            .execute(&ctx, serde_json::json!({"filename": "a.md", "mode": "create"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
