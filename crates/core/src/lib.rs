//! # inkloop Core
//!
//! Domain types, traits, and error definitions for the inkloop agent.
//! Nothing here talks to the network or the filesystem; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is defined as a trait here.
//! Implementations live in their respective crates. This enables:
//! - Swapping the chat endpoint or tool set via configuration
//! - Easy testing with scripted providers and stub tools
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role, ToolCall};
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta,
    ToolDefinition, Usage,
};
pub use tool::{Tool, ToolContext, ToolRegistry, ToolResult};
