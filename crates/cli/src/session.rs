//! Choosing how a session starts: a new task, or a recovered checkpoint.

use inkloop_agent::{CheckpointStore, recovery_seed};
use inkloop_core::error::CheckpointError;
use inkloop_core::message::{Conversation, Message};
use std::io::{BufRead, Write};
use std::path::Path;

/// What the user typed at the interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskInput {
    Task(String),
    Quit,
    Empty,
}

/// Ask for a task on `output` and read one line from `input`.
pub fn read_task(input: &mut impl BufRead, output: &mut impl Write) -> std::io::Result<TaskInput> {
    writeln!(output, "{}", "=".repeat(60))?;
    writeln!(output, "inkloop editor agent")?;
    writeln!(output, "{}", "=".repeat(60))?;
    writeln!(output, "\nEnter your editing request (or 'quit' to exit):")?;
    writeln!(
        output,
        "Example: Review and edit my novel for consistency and pacing\n"
    )?;
    write!(output, "> ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(classify(&line))
}

fn classify(line: &str) -> TaskInput {
    let task = line.trim();
    match task.to_lowercase().as_str() {
        "" => TaskInput::Empty,
        "quit" | "exit" | "q" => TaskInput::Quit,
        _ => TaskInput::Task(task.to_string()),
    }
}

/// A fresh conversation for `task`.
pub fn new_task(system_prompt: &str, task: &str) -> Conversation {
    Conversation::from_messages(vec![Message::system(system_prompt), Message::user(task)])
}

/// A conversation that picks up from the checkpoint at `path`.
pub async fn recover(system_prompt: &str, path: &Path) -> Result<Conversation, CheckpointError> {
    let body = CheckpointStore::load(path).await?;
    Ok(recovery_seed(system_prompt, &body))
}
