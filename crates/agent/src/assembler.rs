//! Stream assembly. Reduce streamed fragments into one assistant message.
//!
//! Fragments are consumed strictly in arrival order. Content and reasoning
//! deltas are concatenated; tool-call deltas are routed by their stream
//! index, so several calls may be open at once with interleaved arguments.

use inkloop_core::message::{Message, Role, ToolCall};
use inkloop_core::provider::{StreamChunk, Usage};
use std::collections::BTreeMap;

/// Working state for one in-flight tool call.
#[derive(Debug, Default, Clone)]
struct ToolCallBuilder {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Mutable accumulator for one streamed turn.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    role: Option<Role>,
    content: String,
    reasoning: String,
    tool_calls: BTreeMap<u32, ToolCallBuilder>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the turn.
    pub fn consume(&mut self, chunk: StreamChunk) {
        if self.role.is_none() {
            self.role = chunk.role;
        }
        if let Some(text) = chunk.content {
            self.content.push_str(&text);
        }
        if let Some(text) = chunk.reasoning {
            self.reasoning.push_str(&text);
        }

        for delta in chunk.tool_calls {
            let builder = self.tool_calls.entry(delta.index).or_default();
            if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                builder.id = Some(id);
            }
            if let Some(name) = delta.name.filter(|n| !n.is_empty()) {
                builder.name = name;
            }
            if let Some(args) = delta.arguments {
                builder.arguments.push_str(&args);
            }
        }

        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
    }

    /// Characters of argument text received so far for a call.
    pub fn argument_chars(&self, index: u32) -> usize {
        self.tool_calls
            .get(&index)
            .map(|b| b.arguments.chars().count())
            .unwrap_or(0)
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Derive the completed message.
    ///
    /// Calls that never received an id are dropped. Empty content and empty
    /// reasoning are reported as absent.
    pub fn finalize(self) -> Message {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_values()
            .filter_map(|b| b.id.map(|id| ToolCall::new(id, b.name, b.arguments)))
            .collect();

        let mut message = Message::assistant_tool_calls(tool_calls);
        message.role = self.role.unwrap_or(Role::Assistant);
        message.content = (!self.content.is_empty()).then_some(self.content);
        message.reasoning_content = (!self.reasoning.is_empty()).then_some(self.reasoning);
        message
    }
}
