//! Tool dispatch. Map a tool call to its handler and normalize the outcome.
//!
//! Nothing a tool does can abort the loop: malformed arguments become an
//! empty object, unknown names and handler errors become result text the
//! model can read and react to.

use inkloop_core::tool::{ToolContext, ToolRegistry, ToolResult};
use inkloop_tools::COMPRESS_CONTEXT;
use std::sync::Arc;
use tracing::warn;

/// What the loop must do with a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The call produced result text for a tool-role message.
    Completed(ToolResult),

    /// The model asked for the reserved compression tool; the loop owns the
    /// conversation, so it performs the compression itself.
    CompressRequested,
}

/// Decode raw argument text. Anything that is not a JSON object becomes `{}`.
pub fn parse_arguments(raw: &str) -> serde_json::Value {
    parse_object(raw).unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
}

fn parse_object(raw: &str) -> Option<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => Some(value),
        Ok(_) | Err(_) => None,
    }
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    ctx: Arc<ToolContext>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, ctx: Arc<ToolContext>) -> Self {
        Self { registry, ctx }
    }

    pub async fn dispatch(&self, tool_name: &str, raw_arguments: &str) -> DispatchOutcome {
        if tool_name == COMPRESS_CONTEXT {
            return DispatchOutcome::CompressRequested;
        }

        let Some(tool) = self.registry.get(tool_name) else {
            warn!(tool = tool_name, "Model called an unknown tool");
            return DispatchOutcome::Completed(ToolResult::failure(format!(
                "Unknown tool '{tool_name}'"
            )));
        };

        let arguments = parse_object(raw_arguments).unwrap_or_else(|| {
            warn!(tool = tool_name, "Malformed tool arguments, using an empty object");
            serde_json::Value::Object(serde_json::Map::new())
        });
        match tool.execute(&self.ctx, arguments).await {
            Ok(result) => DispatchOutcome::Completed(result),
            Err(e) => {
                warn!(tool = tool_name, error = %e, "Tool execution failed");
                DispatchOutcome::Completed(ToolResult::failure(format!("Error: {e}")))
            }
        }
    }
}
