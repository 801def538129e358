//! The agent loop implementation.

use chrono::Utc;
use inkloop_config::AgentConfig;
use inkloop_core::error::ProviderError;
use inkloop_core::event::{DomainEvent, EventBus};
use inkloop_core::message::{Conversation, Message};
use inkloop_core::provider::{Provider, ProviderRequest, StreamChunk};
use inkloop_core::tool::{ToolContext, ToolRegistry, ToolResult};
use inkloop_tools::compress_context_definition;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assembler::StreamAssembler;
use crate::checkpoint::CheckpointStore;
use crate::compressor::ContextCompressor;
use crate::dispatcher::{DispatchOutcome, ToolDispatcher, parse_arguments};
use crate::stream_event::{AgentStreamEvent, NoopObserver, TurnObserver};
use crate::token::{TokenCounter, TokenEstimator};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The model answered without tool calls
    Completed,

    /// `max_iterations` ran out first
    IterationLimit,

    /// The cancellation token fired
    Interrupted,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::IterationLimit => "iteration-limit",
            Self::Interrupted => "interrupted",
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::IterationLimit => 2,
            Self::Interrupted => 130,
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a finished run hands back.
#[derive(Debug)]
pub struct RunReport {
    pub reason: TerminationReason,

    /// The conversation as it stood when the loop stopped
    pub conversation: Conversation,

    /// Iterations started, including failed ones
    pub iterations: u32,

    /// The final checkpoint, if it could be written
    pub checkpoint: Option<PathBuf>,
}

/// The agent loop that orchestrates model calls, compression, and tool execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Session state shared with tools
    ctx: Arc<ToolContext>,

    /// Budget, cadence and ceiling
    settings: AgentConfig,

    /// Sizes the conversation before each call
    counter: Arc<dyn TokenCounter>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Receives live turn output
    observer: Arc<dyn TurnObserver>,

    /// External interrupt
    cancel: CancellationToken,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        ctx: Arc<ToolContext>,
    ) -> Self {
        let model = model.into();
        let counter = Arc::new(TokenEstimator::new(provider.clone(), model.clone()));
        Self {
            provider,
            model,
            temperature: 1.0,
            max_tokens: None,
            tools,
            ctx,
            settings: AgentConfig::default(),
            counter,
            event_bus: Arc::new(EventBus::default()),
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: AgentConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the default remote-then-local estimator.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn compressor(&self) -> ContextCompressor {
        ContextCompressor::new(self.provider.clone(), &self.model, self.counter.clone())
            .with_store(CheckpointStore::new(self.ctx.clone()))
    }

    /// Drive `conversation` until the model is done, the ceiling is hit, or
    /// the run is cancelled.
    ///
    /// Each iteration:
    /// 1. Estimates the conversation and compresses it when over threshold
    /// 2. Writes a full-retention checkpoint on the configured cadence
    /// 3. Streams a turn from the model and assembles it
    /// 4. Stops if the turn has no tool calls, otherwise dispatches them
    ///
    /// Every exit path attempts a final checkpoint.
    pub async fn run(&self, mut conversation: Conversation) -> RunReport {
        let max_iterations = self.settings.max_iterations;
        let trigger = self.settings.compression_trigger();
        let compressor = self.compressor();
        let dispatcher = ToolDispatcher::new(self.tools.clone(), self.ctx.clone());

        let mut tool_definitions = self.tools.definitions();
        tool_definitions.push(compress_context_definition());

        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            max_iterations,
            trigger,
            "Starting agent run"
        );

        let mut iteration = 0;
        let reason = loop {
            if self.cancel.is_cancelled() {
                break TerminationReason::Interrupted;
            }
            if iteration >= max_iterations {
                warn!(
                    conversation_id = %conversation.id,
                    iterations = iteration,
                    "Max iterations reached"
                );
                break TerminationReason::IterationLimit;
            }
            iteration += 1;

            self.event_bus.publish(DomainEvent::IterationStarted {
                iteration,
                max_iterations,
                timestamp: Utc::now(),
            });
            debug!(iteration, messages = conversation.len(), "Agent loop iteration");

            // ── Budget check ──
            let Some(counted) = self
                .unless_cancelled(self.counter.count(&conversation.messages))
                .await
            else {
                break TerminationReason::Interrupted;
            };
            let tokens = match counted {
                Ok(tokens) => tokens,
                Err(e) => {
                    self.iteration_failed(iteration, "Token estimation failed", &e);
                    continue;
                }
            };
            self.event_bus.publish(DomainEvent::TokensEstimated {
                tokens,
                limit: self.settings.token_limit,
                timestamp: Utc::now(),
            });

            if tokens >= trigger {
                info!(iteration, tokens, trigger, "Token budget threshold reached");
                let keep = self.settings.keep_recent;
                if !self.compress_into(&compressor, &mut conversation, keep).await {
                    break TerminationReason::Interrupted;
                }
            }

            // ── Periodic checkpoint ──
            let interval = self.settings.checkpoint_interval;
            if interval > 0
                && iteration % interval == 0
                && self
                    .unless_cancelled(self.checkpoint(&compressor, &conversation, false))
                    .await
                    .is_none()
            {
                break TerminationReason::Interrupted;
            }

            // ── Model call ──
            let request = ProviderRequest {
                model: self.model.clone(),
                messages: conversation.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
                stream: true,
            };

            let message = match self.stream_turn(iteration, request).await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!(iteration, "Model call abandoned on interrupt");
                    break TerminationReason::Interrupted;
                }
                Err(e) => {
                    self.iteration_failed(iteration, "Model call failed", &e);
                    continue;
                }
            };

            if !message.has_tool_calls() {
                conversation.push(message);
                break TerminationReason::Completed;
            }

            // ── Dispatch ──
            let tool_calls = message.tool_calls.clone();
            let turn_len = 1 + tool_calls.len();
            conversation.push(message);

            let mut compress_requested = false;
            for call in &tool_calls {
                let result = self.dispatch_one(&dispatcher, call).await;
                let result = match result {
                    Some(result) => result,
                    None => {
                        compress_requested = true;
                        ToolResult::ok(
                            "Context compression requested. Earlier messages will be \
                             replaced by a summary before the next step.",
                        )
                    }
                };
                conversation.push(Message::tool_result(&call.id, &call.name, result.output));
            }

            if compress_requested {
                let keep = self.settings.keep_recent.max(turn_len);
                if !self.compress_into(&compressor, &mut conversation, keep).await {
                    break TerminationReason::Interrupted;
                }
            }
        };

        // ── Final checkpoint ──
        let offline = reason == TerminationReason::Interrupted;
        let checkpoint = self.checkpoint(&compressor, &conversation, offline).await;
        if let Some(path) = &checkpoint {
            info!("Resume with: inkloop --recover {}", path.display());
        }

        info!(
            conversation_id = %conversation.id,
            reason = %reason,
            iterations = iteration,
            "Agent run finished"
        );
        self.event_bus.publish(DomainEvent::RunFinished {
            reason: reason.as_str().into(),
            iterations: iteration,
            timestamp: Utc::now(),
        });

        RunReport {
            reason,
            conversation,
            iterations: iteration,
            checkpoint,
        }
    }

    /// Stream one turn and assemble it.
    ///
    /// Returns `Ok(None)` when cancelled; nothing partial is kept. A stream
    /// that ends without a finish reason was cut off and is an error.
    async fn stream_turn(
        &self,
        iteration: u32,
        request: ProviderRequest,
    ) -> Result<Option<Message>, ProviderError> {
        let mut rx = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            rx = self.provider.stream(request) => rx?,
        };

        let mut assembler = StreamAssembler::new();
        let mut announced = BTreeSet::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                next = rx.recv() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            let indices = self.observe_chunk(&mut announced, &chunk);
            assembler.consume(chunk);
            for index in indices {
                self.observer.on_event(&AgentStreamEvent::ToolArgumentsProgress {
                    index,
                    chars: assembler.argument_chars(index),
                });
            }
        }

        if assembler.finish_reason().is_none() {
            return Err(ProviderError::StreamInterrupted(
                "stream ended without a finish reason".into(),
            ));
        }

        if let Some(usage) = assembler.usage() {
            debug!(
                iteration,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Turn usage"
            );
        }
        self.observer.on_event(&AgentStreamEvent::TurnFinished {
            iteration,
            finish_reason: assembler.finish_reason().map(String::from),
        });

        Ok(Some(assembler.finalize()))
    }

    /// Report text deltas and newly named calls; return the call indices touched.
    fn observe_chunk(&self, announced: &mut BTreeSet<u32>, chunk: &StreamChunk) -> Vec<u32> {
        if let Some(text) = chunk.reasoning.as_ref().filter(|t| !t.is_empty()) {
            self.observer.on_event(&AgentStreamEvent::Reasoning {
                content: text.clone(),
            });
        }
        if let Some(text) = chunk.content.as_ref().filter(|t| !t.is_empty()) {
            self.observer.on_event(&AgentStreamEvent::Content {
                content: text.clone(),
            });
        }

        let mut indices = Vec::with_capacity(chunk.tool_calls.len());
        for delta in &chunk.tool_calls {
            // Some providers send the id before the name.
            if let Some(name) = delta.name.as_deref().filter(|n| !n.is_empty()) {
                if announced.insert(delta.index) {
                    self.observer.on_event(&AgentStreamEvent::ToolCallStarted {
                        index: delta.index,
                        name: name.to_string(),
                    });
                }
            }
            if delta.arguments.is_some() && !indices.contains(&delta.index) {
                indices.push(delta.index);
            }
        }
        indices
    }

    /// Run one call. `None` means the model asked for compression.
    async fn dispatch_one(
        &self,
        dispatcher: &ToolDispatcher,
        call: &inkloop_core::message::ToolCall,
    ) -> Option<ToolResult> {
        self.observer.on_event(&AgentStreamEvent::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            input: parse_arguments(&call.arguments),
        });

        let start = Instant::now();
        let outcome = dispatcher.dispatch(&call.name, &call.arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let DispatchOutcome::Completed(result) = outcome else {
            info!(tool_call_id = %call.id, "Model requested context compression");
            return None;
        };

        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.success,
            duration_ms,
            timestamp: Utc::now(),
        });
        self.observer.on_event(&AgentStreamEvent::ToolResult {
            id: call.id.clone(),
            name: call.name.clone(),
            output: result.output.clone(),
            success: result.success,
        });
        debug!(tool = %call.name, success = result.success, duration_ms, "Tool executed");

        Some(result)
    }

    /// Await `fut` unless the run is cancelled first.
    async fn unless_cancelled<T>(&self, fut: impl std::future::Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Replace `conversation` with its compressed form; on failure it is
    /// left as is. Returns `false` if cancelled before compression finished.
    async fn compress_into(
        &self,
        compressor: &ContextCompressor,
        conversation: &mut Conversation,
        keep_recent: usize,
    ) -> bool {
        let Some(result) = self
            .unless_cancelled(compressor.compress(conversation, keep_recent))
            .await
        else {
            info!("Compression abandoned on interrupt");
            return false;
        };

        match result {
            Ok(result) => {
                self.event_bus.publish(DomainEvent::ContextCompressed {
                    keep_recent,
                    messages_before: conversation.len(),
                    messages_after: result.new_conversation.len(),
                    tokens_saved: result.estimated_tokens_saved,
                    timestamp: Utc::now(),
                });
                if let Some(path) = result.checkpoint_path {
                    self.checkpoint_written(path);
                }
                *conversation = result.new_conversation;
            }
            Err(e) => {
                warn!(error = %e, "Context compression failed, keeping conversation");
            }
        }
        true
    }

    /// Full-retention snapshot. Never shrinks the conversation.
    async fn checkpoint(
        &self,
        compressor: &ContextCompressor,
        conversation: &Conversation,
        offline: bool,
    ) -> Option<PathBuf> {
        let keep = conversation.len();
        let result = if offline {
            compressor.compress_offline(conversation, keep).await
        } else {
            compressor.compress(conversation, keep).await
        };

        match result {
            Ok(result) => {
                let path = result.checkpoint_path?;
                self.checkpoint_written(path.clone());
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "Checkpoint failed");
                None
            }
        }
    }

    fn checkpoint_written(&self, path: PathBuf) {
        self.event_bus.publish(DomainEvent::CheckpointWritten {
            path,
            timestamp: Utc::now(),
        });
    }

    fn iteration_failed(&self, iteration: u32, what: &str, error: &ProviderError) {
        warn!(iteration, error = %error, "{what}, retrying next iteration");
        self.observer.on_event(&AgentStreamEvent::Error {
            message: format!("{what}: {error}"),
        });
        self.event_bus.publish(DomainEvent::IterationFailed {
            iteration,
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}
