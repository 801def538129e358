//! End-to-end tests for the inkloop agent pipeline.
//!
//! These drive the real tool registry and agent loop with a scripted,
//! fragment-streaming provider and check what lands on disk.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use inkloop_agent::{AgentLoop, AgentStreamEvent, CheckpointStore, TerminationReason, TurnObserver};
use inkloop_config::AgentConfig;
use inkloop_core::error::ProviderError;
use inkloop_core::event::{DomainEvent, EventBus};
use inkloop_core::message::{Conversation, Message, Role};
use inkloop_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta,
};
use inkloop_core::tool::ToolContext;
use inkloop_tools::default_registry;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Streams each scripted turn as many small fragments.
struct ScriptedProvider {
    turns: Mutex<VecDeque<Vec<StreamChunk>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(vec![]),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    /// Only summaries come through here.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            message: Message::assistant("## Task objective\nEdit the novel.\n\n## Next steps\nChapter 2."),
            usage: None,
            model: request.model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| text_turn("Done."));

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tokio::spawn(async move {
            for chunk in turn {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

fn text_turn(text: &str) -> Vec<StreamChunk> {
    let mut chunks = vec![StreamChunk {
        role: Some(Role::Assistant),
        ..StreamChunk::default()
    }];
    chunks.push(StreamChunk::reasoning("Wrapping up."));
    for word in text.split_inclusive(' ') {
        chunks.push(StreamChunk::content(word));
    }
    chunks.push(StreamChunk::finish("stop"));
    chunks
}

/// One tool call whose argument text arrives in small pieces.
fn tool_turn(id: &str, name: &str, arguments: &str) -> Vec<StreamChunk> {
    let mut chunks = vec![
        StreamChunk::reasoning("Next I will call a tool."),
        StreamChunk::tool_call(ToolCallDelta {
            index: 0,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: Some(String::new()),
        }),
    ];
    let chars: Vec<char> = arguments.chars().collect();
    for piece in chars.chunks(7) {
        chunks.push(StreamChunk::tool_call(ToolCallDelta {
            index: 0,
            arguments: Some(piece.iter().collect()),
            ..ToolCallDelta::default()
        }));
    }
    chunks.push(StreamChunk::finish("tool_calls"));
    chunks
}

/// Records every observer event.
#[derive(Default)]
struct Recorder(Mutex<Vec<AgentStreamEvent>>);

impl TurnObserver for Recorder {
    fn on_event(&self, event: &AgentStreamEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

fn seed(task: &str) -> Conversation {
    Conversation::from_messages(vec![
        Message::system("You are an editor."),
        Message::user(task),
    ])
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn edits_land_in_the_project_folder() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn("call_1", "create_project", r#"{"project_name":"My Novel"}"#),
        tool_turn(
            "call_2",
            "write_file",
            r##"{"filename":"chapter_1","content":"# Chapter 1\n\nIt was a dark night.","mode":"create"}"##,
        ),
        tool_turn("call_3", "read_file", r#"{"filename":"chapter_1.md"}"#),
        text_turn("Chapter one is edited."),
    ]));
    let recorder = Arc::new(Recorder::default());
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();

    let agent = AgentLoop::new(
        provider.clone(),
        "mock-model",
        Arc::new(default_registry()),
        Arc::new(ToolContext::new(dir.path())),
    )
    .with_observer(recorder.clone())
    .with_event_bus(bus.clone());

    let report = agent.run(seed("Edit my novel")).await;

    assert_eq!(report.reason, TerminationReason::Completed);
    assert_eq!(report.iterations, 4);
    assert_eq!(provider.calls(), 4);
    assert_eq!(report.conversation.tool_pairing_violation(), None);

    let chapter = dir.path().join("My_Novel").join("chapter_1.md");
    assert_eq!(
        std::fs::read_to_string(&chapter).unwrap(),
        "# Chapter 1\n\nIt was a dark night."
    );

    // read_file saw what write_file wrote in the previous turn
    let read_result = report
        .conversation
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("call_3"))
        .unwrap();
    assert!(read_result.text().contains("It was a dark night."));

    let last = report.conversation.messages.last().unwrap();
    assert_eq!(last.text(), "Chapter one is edited.");
    assert_eq!(last.reasoning_content.as_deref(), Some("Wrapping up."));

    // The final checkpoint goes to the active project
    let checkpoint = report.checkpoint.unwrap();
    assert_eq!(checkpoint.parent().unwrap(), dir.path().join("My_Novel"));
    let body = CheckpointStore::load(&checkpoint).await.unwrap();
    assert!(body.starts_with("# Context Summary ("));

    let recorded = recorder.0.lock().unwrap();
    assert!(recorded.iter().any(|e| matches!(
        e,
        AgentStreamEvent::ToolCallStarted { name, .. } if name == "write_file"
    )));
    assert!(recorded.iter().any(|e| matches!(
        e,
        AgentStreamEvent::ToolArgumentsProgress { chars, .. } if *chars > 50
    )));

    let mut tools_run = 0;
    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        match event.as_ref() {
            DomainEvent::ToolExecuted { success, .. } => {
                assert!(success);
                tools_run += 1;
            }
            DomainEvent::RunFinished { reason, .. } => finished = Some(reason.clone()),
            _ => {}
        }
    }
    assert_eq!(tools_run, 3);
    assert_eq!(finished.as_deref(), Some("completed"));
}

#[tokio::test]
async fn tool_failures_are_visible_to_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        // No project yet
        tool_turn("call_1", "read_file", r#"{"filename":"missing"}"#),
        tool_turn("call_2", "write_file", "{broken json"),
        text_turn("Giving up."),
    ]));

    let agent = AgentLoop::new(
        provider,
        "mock-model",
        Arc::new(default_registry()),
        Arc::new(ToolContext::new(dir.path())),
    );
    let report = agent.run(seed("Edit")).await;

    assert_eq!(report.reason, TerminationReason::Completed);
    let results: Vec<&Message> = report
        .conversation
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|m| !m.text().is_empty()));
    assert_eq!(report.conversation.tool_pairing_violation(), None);
}

#[tokio::test]
async fn recovered_session_continues_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(ToolContext::new(dir.path()));
    let store = CheckpointStore::new(ctx.clone());
    let path = store
        .write("# Context Summary (2025-01-07 14:30:22)\n\nChapters 1-3 edited.")
        .await
        .unwrap();

    let body = CheckpointStore::load(&path).await.unwrap();
    let conversation = inkloop_agent::recovery_seed("You are an editor.", &body);

    let provider = Arc::new(ScriptedProvider::new(vec![text_turn("Resumed.")]));
    let settings = AgentConfig {
        max_iterations: 5,
        ..AgentConfig::default()
    };
    let agent = AgentLoop::new(provider.clone(), "mock-model", Arc::new(default_registry()), ctx)
        .with_settings(settings);
    let report = agent.run(conversation).await;

    assert_eq!(report.reason, TerminationReason::Completed);
    let first_request = provider.requests.lock().unwrap()[0].clone();
    assert_eq!(first_request.messages.len(), 2);
    assert!(first_request.messages[1].text().contains("Chapters 1-3 edited."));
    assert!(
        first_request
            .tools
            .iter()
            .any(|t| t.name == "compress_context")
    );
}
