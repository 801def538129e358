//! Token estimation.
//!
//! The budget check asks the endpoint for an exact count when it can and
//! falls back to a character heuristic otherwise: ~4 characters per token,
//! plus a small fixed overhead per message and per reply.

use async_trait::async_trait;
use inkloop_core::error::ProviderError;
use inkloop_core::message::Message;
use inkloop_core::provider::Provider;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

const MESSAGE_OVERHEAD: usize = 4;
const NAME_OVERHEAD: usize = 1;
const REPLY_PRIMING: usize = 3;

/// Anything that can size a conversation in tokens.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    async fn count(&self, messages: &[Message]) -> Result<usize, ProviderError>;
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Counts the fields that are sent to the endpoint. Reasoning text is not
/// re-sent, so it does not count against the budget.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = MESSAGE_OVERHEAD + estimate_tokens(message.role.as_str());

    if let Some(content) = &message.content {
        tokens += estimate_tokens(content);
    }
    if let Some(name) = &message.name {
        tokens += estimate_tokens(name) + NAME_OVERHEAD;
    }
    if let Some(id) = &message.tool_call_id {
        tokens += estimate_tokens(id);
    }
    for call in &message.tool_calls {
        tokens += estimate_tokens(&call.name) + estimate_tokens(&call.arguments);
    }

    tokens
}

/// Estimate tokens for a whole conversation, including reply priming.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum::<usize>() + REPLY_PRIMING
}

/// Purely local estimator. Deterministic and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTokenCounter;

#[async_trait]
impl TokenCounter for LocalTokenCounter {
    async fn count(&self, messages: &[Message]) -> Result<usize, ProviderError> {
        Ok(estimate_messages_tokens(messages))
    }
}

/// Remote estimate with local fallback.
///
/// Once the endpoint reports that it cannot estimate, later calls go
/// straight to the local heuristic.
pub struct TokenEstimator {
    provider: Arc<dyn Provider>,
    model: String,
    remote_unsupported: AtomicBool,
}

impl TokenEstimator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            remote_unsupported: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TokenCounter for TokenEstimator {
    async fn count(&self, messages: &[Message]) -> Result<usize, ProviderError> {
        if self.remote_unsupported.load(Ordering::Relaxed) {
            return Ok(estimate_messages_tokens(messages));
        }

        match self.provider.count_tokens(&self.model, messages).await {
            Ok(tokens) => Ok(tokens as usize),
            Err(ProviderError::Unsupported(reason)) => {
                debug!(provider = self.provider.name(), %reason, "Using local token estimation");
                self.remote_unsupported.store(true, Ordering::Relaxed);
                Ok(estimate_messages_tokens(messages))
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Token estimate failed, using local estimation");
                Ok(estimate_messages_tokens(messages))
            }
        }
    }
}
