//! Context compression. Replace older history with a summary message.
//!
//! The first message (system prompt) and the most recent `keep_recent`
//! messages are kept verbatim; everything between them is summarized into a
//! single timestamped user message. The retained window never starts on a
//! tool result, so a tool call and its results stay together.
//!
//! With `keep_recent` covering the whole conversation nothing is dropped;
//! the call then only produces a checkpoint of the full history.

use chrono::Local;
use inkloop_core::error::Result;
use inkloop_core::message::{Conversation, Message, Role};
use inkloop_core::provider::{Provider, ProviderRequest};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::token::{TokenCounter, estimate_messages_tokens};

const SUMMARY_MAX_TOKENS: u32 = 4096;
const TRANSCRIPT_FIELD_CHARS: usize = 2000;
const EXCERPT_CHARS: usize = 1200;

const SUMMARIZER_PROMPT: &str = "You are a context summarizer for a long-running writing and \
editing agent. Summarize the conversation you are given so the agent can continue the task \
with no other prior detail available. Cover, under clear markdown headings: the task \
objective, the files and artifacts created or modified so far, the key decisions made, and \
the outstanding next steps. Be specific about file names and progress. Do not invent work \
that did not happen.";

/// Outcome of one compression.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    /// The replacement conversation
    pub new_conversation: Conversation,

    /// The summary text, without the header
    pub summary_text: String,

    /// Estimated tokens before minus tokens after
    pub estimated_tokens_saved: usize,

    /// Where the summary was persisted, if it was
    pub checkpoint_path: Option<PathBuf>,

    /// Number of messages folded into the summary
    pub messages_summarized: usize,
}

impl CompressionResult {
    /// Whether the conversation was actually shortened.
    pub fn shortened(&self) -> bool {
        self.messages_summarized > 0
    }
}

pub struct ContextCompressor {
    provider: Arc<dyn Provider>,
    model: String,
    counter: Arc<dyn TokenCounter>,
    store: Option<CheckpointStore>,
}

impl ContextCompressor {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            counter,
            store: None,
        }
    }

    /// Persist every summary through `store`.
    pub fn with_store(mut self, store: CheckpointStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Compress `conversation`, keeping its last `keep_recent` messages.
    ///
    /// The input is never mutated; the result holds a brand-new conversation.
    pub async fn compress(
        &self,
        conversation: &Conversation,
        keep_recent: usize,
    ) -> Result<CompressionResult> {
        self.compress_with(conversation, keep_recent, true).await
    }

    /// Like [`compress`](Self::compress), but never calls the model.
    ///
    /// Used when the session is shutting down and the checkpoint must not
    /// wait on the network.
    pub async fn compress_offline(
        &self,
        conversation: &Conversation,
        keep_recent: usize,
    ) -> Result<CompressionResult> {
        self.compress_with(conversation, keep_recent, false).await
    }

    async fn compress_with(
        &self,
        conversation: &Conversation,
        keep_recent: usize,
        use_model: bool,
    ) -> Result<CompressionResult> {
        let messages = &conversation.messages;
        let boundary = retention_boundary(messages, keep_recent);
        let head = messages.len().min(1);

        // Full retention: summarize everything for the checkpoint, drop nothing.
        let (to_summarize, retained_from) = if boundary <= head {
            (&messages[head..], None)
        } else {
            (&messages[head..boundary], Some(boundary))
        };

        let summary_text = if use_model {
            self.summarize(to_summarize).await
        } else {
            extractive_summary(to_summarize)
        };
        let summary_message = summary_message(&summary_text, to_summarize.len());

        let new_conversation = match retained_from {
            Some(boundary) => {
                let mut replaced = Vec::with_capacity(messages.len() - boundary + 2);
                replaced.extend(messages[..head].iter().cloned());
                replaced.push(summary_message.clone());
                replaced.extend(messages[boundary..].iter().cloned());
                conversation.replaced_with(replaced)
            }
            None => conversation.clone(),
        };

        // Offline and full-retention passes stay local; neither may wait on the network.
        let (old_tokens, new_tokens) = match retained_from {
            None => {
                let tokens = estimate_messages_tokens(messages);
                (tokens, tokens)
            }
            Some(_) if !use_model => (
                estimate_messages_tokens(messages),
                estimate_messages_tokens(&new_conversation.messages),
            ),
            Some(_) => (
                self.counter.count(messages).await?,
                self.counter.count(&new_conversation.messages).await?,
            ),
        };
        let estimated_tokens_saved = old_tokens.saturating_sub(new_tokens);

        let checkpoint_path = match &self.store {
            Some(store) => match store.write(summary_message.text()).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, "Failed to write checkpoint");
                    None
                }
            },
            None => None,
        };

        let messages_summarized = if retained_from.is_some() {
            to_summarize.len()
        } else {
            0
        };

        info!(
            before = messages.len(),
            after = new_conversation.len(),
            summarized = messages_summarized,
            old_tokens,
            new_tokens,
            "Context compressed"
        );

        Ok(CompressionResult {
            new_conversation,
            summary_text,
            estimated_tokens_saved,
            checkpoint_path,
            messages_summarized,
        })
    }

    /// Ask the model for a summary, falling back to an extractive one.
    async fn summarize(&self, messages: &[Message]) -> String {
        if messages.is_empty() {
            return "No earlier conversation to summarize.".into();
        }

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(SUMMARIZER_PROMPT),
                Message::user(render_transcript(messages)),
            ],
            temperature: 1.0,
            max_tokens: Some(SUMMARY_MAX_TOKENS),
            tools: vec![],
            stream: false,
        };

        match self.provider.complete(request).await {
            Ok(response) => match response.message.content {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => {
                    warn!("Summary call returned no text, using extractive summary");
                    extractive_summary(messages)
                }
            },
            Err(e) => {
                warn!(error = %e, "Summary call failed, using extractive summary");
                extractive_summary(messages)
            }
        }
    }
}

/// Index of the first retained tail message.
///
/// Moves backwards past tool results so the assistant message that issued
/// the calls is retained with them. Never goes below 1 (the system message).
pub fn retention_boundary(messages: &[Message], keep_recent: usize) -> usize {
    let len = messages.len();
    let mut boundary = len.saturating_sub(keep_recent).max(1.min(len));

    while boundary > 1 && boundary < len && messages[boundary].role == Role::Tool {
        boundary -= 1;
    }

    debug!(len, keep_recent, boundary, "Computed retention boundary");
    boundary
}

fn summary_message(summary: &str, summarized: usize) -> Message {
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    Message::user(format!(
        "# Context Summary ({stamp})\n\n\
         _{summarized} earlier messages were condensed into this summary._\n\n\
         {summary}"
    ))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        out.push_str(&format!("[{}]", msg.role.as_str()));
        if let Some(name) = &msg.name {
            out.push_str(&format!(" ({name})"));
        }
        out.push('\n');
        if let Some(content) = &msg.content {
            out.push_str(&truncate(content, TRANSCRIPT_FIELD_CHARS));
            out.push('\n');
        }
        for call in &msg.tool_calls {
            out.push_str(&format!(
                "-> {}({})\n",
                call.name,
                truncate(&call.arguments, 300)
            ));
        }
        out.push('\n');
    }
    out
}

/// A deterministic summary built without the model.
pub fn extractive_summary(messages: &[Message]) -> String {
    let objective = messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| truncate(m.text(), EXCERPT_CHARS))
        .unwrap_or_else(|| "(no user request found)".into());

    let mut files = BTreeSet::new();
    for call in messages.iter().flat_map(|m| &m.tool_calls) {
        let args = crate::dispatcher::parse_arguments(&call.arguments);
        for key in ["filename", "project_name"] {
            if let Some(value) = args.get(key).and_then(|v| v.as_str()) {
                files.insert(format!("{value} ({})", call.name));
            }
        }
    }

    let latest = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && m.content.is_some())
        .map(|m| truncate(m.text(), EXCERPT_CHARS))
        .unwrap_or_else(|| "(no assistant output yet)".into());

    let artifacts = if files.is_empty() {
        "- none recorded".to_string()
    } else {
        files
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "## Task objective\n{objective}\n\n\
         ## Files and artifacts touched\n{artifacts}\n\n\
         ## Latest assistant output\n{latest}\n\n\
         ## Next steps\nContinue the task from the most recent messages. \
         {} messages were summarized.",
        messages.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::LocalTokenCounter;
    use async_trait::async_trait;
    use inkloop_core::error::ProviderError;
    use inkloop_core::message::ToolCall;
    use inkloop_core::provider::ProviderResponse;
    use inkloop_core::tool::ToolContext;

    /// Summaries come from a fixed string, or fail.
    struct Summarizer(Option<&'static str>);

    #[async_trait]
    impl Provider for Summarizer {
        fn name(&self) -> &str {
            "summarizer"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            match self.0 {
                Some(text) => Ok(ProviderResponse {
                    message: Message::assistant(text),
                    usage: None,
                    model: request.model,
                }),
                None => Err(ProviderError::Network("offline".into())),
            }
        }
    }

    fn compressor(summary: Option<&'static str>) -> ContextCompressor {
        ContextCompressor::new(Arc::new(Summarizer(summary)), "m", Arc::new(LocalTokenCounter))
    }

    /// system, user, then `rounds` of (assistant call, tool result, assistant text).
    fn long_conversation(rounds: usize) -> Conversation {
        let mut conv = Conversation::new();
        conv.push(Message::system("You are an editor."));
        conv.push(Message::user("Edit my novel for pacing."));
        for i in 0..rounds {
            let id = format!("call_{i}");
            conv.push(Message::assistant_tool_calls(vec![ToolCall::new(
                &id,
                "read_file",
                format!("{{\"filename\":\"chapter_{i}.md\"}}"),
            )]));
            conv.push(Message::tool_result(&id, "read_file", "x".repeat(2000)));
            conv.push(Message::assistant(format!("Chapter {i} reviewed.")));
        }
        conv
    }

    #[tokio::test]
    async fn keeps_system_and_recent_tail_verbatim() {
        let conv = long_conversation(6);
        let result = compressor(Some("All chapters read.")).compress(&conv, 4).await.unwrap();
        let new = &result.new_conversation.messages;

        assert_eq!(new[0], conv.messages[0]);
        assert!(new[1].text().starts_with("# Context Summary ("));
        assert!(new[1].text().contains("All chapters read."));
        assert_eq!(result.summary_text, "All chapters read.");

        let tail = &new[2..];
        assert_eq!(tail, &conv.messages[conv.len() - tail.len()..]);
        assert!(tail.len() >= 4);
        assert_eq!(result.new_conversation.tool_pairing_violation(), None);
        assert_eq!(result.new_conversation.id, conv.id);
    }

    #[tokio::test]
    async fn boundary_never_splits_a_tool_pair() {
        let conv = long_conversation(5);
        for keep in 0..conv.len() {
            let boundary = retention_boundary(&conv.messages, keep);
            assert_ne!(conv.messages[boundary.min(conv.len() - 1)].role, Role::Tool);

            let result = compressor(None).compress(&conv, keep).await.unwrap();
            assert_eq!(
                result.new_conversation.tool_pairing_violation(),
                None,
                "keep_recent={keep}"
            );
        }
    }

    #[tokio::test]
    async fn compression_relieves_tokens() {
        let conv = long_conversation(8);
        let before = LocalTokenCounter.count(&conv.messages).await.unwrap();
        let result = compressor(None).compress(&conv, 3).await.unwrap();
        let after = LocalTokenCounter
            .count(&result.new_conversation.messages)
            .await
            .unwrap();

        assert!(after < before);
        assert_eq!(result.estimated_tokens_saved, before - after);
        assert!(result.shortened());
    }

    #[tokio::test]
    async fn full_retention_keeps_everything_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(Arc::new(ToolContext::new(dir.path())));
        let conv = long_conversation(2);

        let result = compressor(Some("snapshot"))
            .with_store(store)
            .compress(&conv, conv.len())
            .await
            .unwrap();

        assert_eq!(result.new_conversation.messages, conv.messages);
        assert!(!result.shortened());
        assert_eq!(result.estimated_tokens_saved, 0);

        let path = result.checkpoint_path.unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.starts_with("# Context Summary ("));
        assert!(body.contains("snapshot"));
    }

    #[tokio::test]
    async fn input_is_not_mutated() {
        let conv = long_conversation(4);
        let snapshot = conv.messages.clone();
        let _ = compressor(None).compress(&conv, 2).await.unwrap();
        assert_eq!(conv.messages, snapshot);
    }

    #[tokio::test]
    async fn offline_compression_skips_the_model() {
        let conv = long_conversation(3);
        let result = compressor(Some("model summary"))
            .compress_offline(&conv, conv.len())
            .await
            .unwrap();
        assert!(!result.summary_text.contains("model summary"));
        assert!(result.summary_text.contains("## Task objective"));
    }

    /// Counts locally and remembers how often it was asked.
    #[derive(Default)]
    struct CountingCounter {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl TokenCounter for CountingCounter {
        async fn count(&self, messages: &[Message]) -> std::result::Result<usize, ProviderError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(estimate_messages_tokens(messages))
        }
    }

    #[tokio::test]
    async fn checkpoint_only_passes_never_consult_the_counter() {
        let counter = Arc::new(CountingCounter::default());
        let compressor = ContextCompressor::new(
            Arc::new(Summarizer(Some("summary"))),
            "m",
            counter.clone(),
        );
        let conv = long_conversation(4);

        let full = compressor.compress(&conv, conv.len()).await.unwrap();
        assert_eq!(full.estimated_tokens_saved, 0);
        let offline = compressor.compress_offline(&conv, 3).await.unwrap();
        assert!(offline.estimated_tokens_saved > 0);
        assert_eq!(counter.calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        compressor.compress(&conv, 3).await.unwrap();
        assert_eq!(counter.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn extractive_summary_names_files_and_objective() {
        let conv = long_conversation(2);
        let summary = extractive_summary(&conv.messages[1..]);
        assert!(summary.contains("Edit my novel for pacing."));
        assert!(summary.contains("chapter_0.md (read_file)"));
        assert!(summary.contains("chapter_1.md (read_file)"));
        assert!(summary.contains("Chapter 1 reviewed."));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("hi", 5), "hi");
    }
}
