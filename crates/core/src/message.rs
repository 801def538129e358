//! Message and Conversation domain types.
//!
//! These are the core value objects that flow through the agent loop:
//! the conversation is sent to the model, the streamed turn is assembled into
//! a `Message`, and tool results are appended as tool-role messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (persona, rules)
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single message in a conversation.
///
/// Optional fields are genuinely optional: an assistant turn that only
/// reasons and calls tools has `content: None`, which is distinct from
/// `Some(String::new())`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Model-internal deliberation. Kept for audit and checkpoints only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,

    /// Tool calls requested by the assistant, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// If this is a tool result, the name of the tool that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            reasoning_content: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, Some(content.into()))
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message that only carries tool calls.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, None);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(name.into());
        msg
    }

    /// The text content, or an empty string when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call within its turn
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as the raw serialized payload the model produced
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A conversation is an ordered sequence of messages. Order is the model's memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a conversation that starts from the given messages.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut conv = Self::new();
        conv.messages = messages;
        conv
    }

    /// Build a replacement for `self` that keeps the identity but swaps the messages.
    pub fn replaced_with(&self, messages: Vec<Message>) -> Self {
        Self {
            id: self.id.clone(),
            messages,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Describe the first violation of tool-call/tool-result pairing, if any.
    ///
    /// Every tool-role message must answer a call of the closest preceding
    /// assistant message, and every call of an assistant message must be
    /// answered exactly once before the next non-tool message.
    pub fn tool_pairing_violation(&self) -> Option<String> {
        let mut open: Vec<&str> = Vec::new();
        let mut answered: Vec<&str> = Vec::new();

        for (i, msg) in self.messages.iter().enumerate() {
            if msg.role == Role::Tool {
                let Some(call_id) = msg.tool_call_id.as_deref() else {
                    return Some(format!("tool message at {i} has no tool_call_id"));
                };
                if !open.contains(&call_id) {
                    return Some(format!(
                        "tool message at {i} answers unknown call '{call_id}'"
                    ));
                }
                if answered.contains(&call_id) {
                    return Some(format!("call '{call_id}' answered twice (at {i})"));
                }
                answered.push(call_id);
                continue;
            }

            if let Some(missing) = open.iter().find(|id| !answered.contains(*id)) {
                return Some(format!("call '{missing}' unanswered before message {i}"));
            }
            open = msg.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
            answered.clear();
        }

        open.iter()
            .find(|id| !answered.contains(*id))
            .map(|missing| format!("call '{missing}' unanswered at end of conversation"))
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
