//! Domain event system. Decoupled observation of the agent loop.
//!
//! Events are published when something interesting happens during a run.
//! Other components can subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A loop iteration began
    IterationStarted {
        iteration: u32,
        max_iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// The conversation size was estimated before a model call
    TokensEstimated {
        tokens: usize,
        limit: usize,
        timestamp: DateTime<Utc>,
    },

    /// The conversation was replaced by a compressed version
    ContextCompressed {
        keep_recent: usize,
        messages_before: usize,
        messages_after: usize,
        tokens_saved: usize,
        timestamp: DateTime<Utc>,
    },

    /// A recovery artifact was written
    CheckpointWritten {
        path: PathBuf,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An iteration was abandoned after a recoverable failure
    IterationFailed {
        iteration: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The run reached a terminal state
    RunFinished {
        reason: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
