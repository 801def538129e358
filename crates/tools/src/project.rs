//! Project tool. Create or select the active project folder.
//!
//! Also hosts the path helpers the file tools share: every filename the
//! model supplies is resolved inside the active project folder.

use async_trait::async_trait;
use inkloop_core::error::ToolError;
use inkloop_core::tool::{Tool, ToolContext, ToolResult};
use std::path::PathBuf;
use tracing::info;

pub(crate) const NO_ACTIVE_PROJECT: &str =
    "Error: No active project folder. Please create or set a project first using create_project.";

/// Reduce a free-form project name to a safe folder name.
///
/// Keeps letters, digits, `-` and `_`; runs of whitespace become a single `_`;
/// everything else is dropped.
pub fn sanitize_project_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.trim().chars() {
        if c.is_whitespace() {
            pending_sep = !out.is_empty();
        } else if c.is_alphanumeric() || c == '-' || c == '_' {
            if pending_sep {
                out.push('_');
                pending_sep = false;
            }
            out.push(c);
        }
    }

    out
}

/// Resolve `filename` inside the active project folder.
///
/// Appends `.md` when the name has no extension. Returns the error text to
/// hand back to the model when there is no active project or the name would
/// escape the folder.
pub(crate) fn resolve_project_file(
    ctx: &ToolContext,
    filename: &str,
) -> Result<(PathBuf, String), String> {
    let folder = ctx.active_project().ok_or_else(|| NO_ACTIVE_PROJECT.to_string())?;

    let filename = filename.trim();
    if filename.is_empty() {
        return Err("Error: Filename must not be empty.".into());
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(format!(
            "Error: Invalid filename '{filename}'. Files must live directly in the project folder."
        ));
    }

    let filename = if filename.contains('.') {
        filename.to_string()
    } else {
        format!("{filename}.md")
    };

    Ok((folder.join(&filename), filename))
}

pub struct CreateProjectTool;

#[async_trait]
impl Tool for CreateProjectTool {
    fn name(&self) -> &str {
        "create_project"
    }

    fn description(&self) -> &str {
        "Creates a new project folder in the 'output' directory for organizing edited content. \
         Can also be used to set an existing project folder as active."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project_name": {
                    "type": "string",
                    "description": "The name for the project folder (will be sanitized for filesystem compatibility)"
                }
            },
            "required": ["project_name"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let raw = arguments["project_name"].as_str().ok_or_else(|| {
            ToolError::InvalidArguments("Missing 'project_name' argument".into())
        })?;

        let name = sanitize_project_name(raw);
        if name.is_empty() {
            return Ok(ToolResult::failure(format!(
                "Error: Project name '{raw}' has no usable characters."
            )));
        }

        let folder = ctx.output_root().join(&name);
        if folder.is_dir() {
            ctx.set_active_project(&folder);
            info!(project = %name, "Activated existing project folder");
            return Ok(ToolResult::ok(format!(
                "Project folder '{name}' already exists and is now the active project."
            )));
        }

        if let Err(e) = tokio::fs::create_dir_all(&folder).await {
            return Ok(ToolResult::failure(format!(
                "Error creating project folder '{name}': {e}"
            )));
        }

        ctx.set_active_project(&folder);
        info!(project = %name, path = %folder.display(), "Created project folder");
        Ok(ToolResult::ok(format!(
            "Created project folder '{name}' at {} and set it as the active project.",
            folder.display()
        )))
    }
}
