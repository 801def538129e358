//! Turn-level streaming events.
//!
//! `AgentStreamEvent` lifts provider stream chunks and dispatch results into
//! events a front end can render as they happen: reasoning and content as
//! they arrive, tool-argument progress while a call is still being written,
//! and each tool's result once it runs.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent while a turn is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial reasoning text. Shown, never re-sent.
    Reasoning { content: String },

    /// Partial answer text.
    Content { content: String },

    /// The model opened a new tool call at `index`.
    ToolCallStarted { index: u32, name: String },

    /// Argument text received so far for the call at `index`.
    ToolArgumentsProgress { index: u32, chars: usize },

    /// The stream for this turn ended.
    TurnFinished {
        iteration: u32,
        finish_reason: Option<String>,
    },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// A recoverable failure; the loop moves on to the next iteration.
    Error { message: String },
}

impl AgentStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Reasoning { .. } => "reasoning",
            Self::Content { .. } => "content",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolArgumentsProgress { .. } => "tool_arguments_progress",
            Self::TurnFinished { .. } => "turn_finished",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
        }
    }
}

/// Receives events synchronously from the loop, in order.
pub trait TurnObserver: Send + Sync {
    fn on_event(&self, event: &AgentStreamEvent);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {
    fn on_event(&self, _event: &AgentStreamEvent) {}
}
