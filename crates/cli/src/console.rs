//! Terminal rendering of a streamed turn.

use inkloop_agent::{AgentStreamEvent, TurnObserver};
use std::io::Write;
use std::sync::Mutex;

const RULE: &str = "────────────────────────────────────────────────────────────";

/// Which section of the turn is currently being printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Reasoning,
    Content,
    ToolCall,
}

/// Prints reasoning and content as they stream, and a live character count
/// while tool arguments are being generated.
pub struct ConsoleObserver {
    section: Mutex<Section>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self {
            section: Mutex::new(Section::None),
        }
    }

    fn enter(&self, next: Section, header: impl FnOnce() -> String) {
        let mut section = self.section.lock().unwrap_or_else(|e| e.into_inner());
        if *section != next {
            if *section != Section::None {
                println!("\n{RULE}");
            }
            println!("{}", header());
            *section = next;
        }
    }

    fn reset(&self) {
        let mut section = self.section.lock().unwrap_or_else(|e| e.into_inner());
        if *section != Section::None {
            println!("\n{RULE}");
        }
        *section = Section::None;
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::new()
    }
}

/// Status line for tool-argument progress; words are estimated at 5 chars.
pub fn progress_line(chars: usize) -> String {
    format!("Generating arguments... {chars} characters (~{} words)", chars / 5)
}

/// Whether a progress update is worth redrawing.
fn should_redraw(chars: usize) -> bool {
    chars < 100 || chars % 500 < 20
}

impl TurnObserver for ConsoleObserver {
    fn on_event(&self, event: &AgentStreamEvent) {
        match event {
            AgentStreamEvent::Reasoning { content } => {
                self.enter(Section::Reasoning, || "🧠 Reasoning".into());
                print!("{content}");
            }
            AgentStreamEvent::Content { content } => {
                self.enter(Section::Content, || "💬 Response".into());
                print!("{content}");
            }
            AgentStreamEvent::ToolCallStarted { name, .. } => {
                self.reset();
                self.enter(Section::ToolCall, || format!("🔧 Preparing tool call: {name}"));
            }
            AgentStreamEvent::ToolArgumentsProgress { chars, .. } => {
                if should_redraw(*chars) {
                    print!("\r{}", progress_line(*chars));
                }
            }
            AgentStreamEvent::TurnFinished { .. } => self.reset(),
            AgentStreamEvent::ToolCall { name, .. } => {
                println!("⚙️  Running {name}");
            }
            AgentStreamEvent::ToolResult { output, success, .. } => {
                let mark = if *success { "✓" } else { "✗" };
                let first = output.lines().next().unwrap_or("");
                println!("{mark} {first}");
            }
            AgentStreamEvent::Error { message } => {
                self.reset();
                eprintln!("⚠️  {message}");
            }
        }
        let _ = std::io::stdout().flush();
    }
}
