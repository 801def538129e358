//! Checkpoint files. Durable, human-readable recovery artifacts.
//!
//! A checkpoint is a markdown file named `.context_summary_YYYYMMDD_HHMMSS.md`
//! holding the body of a context summary message. It is written into the
//! active project folder, or the output root when no project is active.
//! Feeding it back through [`recovery_seed`] starts a new conversation that
//! continues the previous one.

use chrono::{DateTime, Local};
use inkloop_core::error::CheckpointError;
use inkloop_core::message::{Conversation, Message};
use inkloop_core::tool::ToolContext;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const PREFIX: &str = ".context_summary_";

/// Writes and reads checkpoint files for one session.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    ctx: Arc<ToolContext>,
}

impl CheckpointStore {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    /// The file name a checkpoint taken at `at` gets.
    pub fn file_name(at: DateTime<Local>) -> String {
        format!("{PREFIX}{}.md", at.format("%Y%m%d_%H%M%S"))
    }

    /// Write `body` to a new checkpoint file and return its path.
    ///
    /// Never overwrites: a second checkpoint in the same second gets a
    /// numeric suffix.
    pub async fn write(&self, body: &str) -> Result<PathBuf, CheckpointError> {
        let dir = self.ctx.checkpoint_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let base = Self::file_name(Local::now());
        let mut path = dir.join(&base);
        let mut n = 2;
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let stem = base.trim_end_matches(".md");
            path = dir.join(format!("{stem}_{n}.md"));
            n += 1;
        }

        tokio::fs::write(&path, body)
            .await
            .map_err(|e| io_error(&path, e))?;

        info!(path = %path.display(), bytes = body.len(), "Checkpoint written");
        Ok(path)
    }

    /// Read a checkpoint body back. An empty file is an error.
    pub async fn load(path: &Path) -> Result<String, CheckpointError> {
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error(path, e))?;
        if body.trim().is_empty() {
            return Err(CheckpointError::Empty(path.to_path_buf()));
        }
        Ok(body)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> CheckpointError {
    CheckpointError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Start a conversation that resumes from a checkpoint body.
pub fn recovery_seed(system_prompt: &str, body: &str) -> Conversation {
    Conversation::from_messages(vec![
        Message::system(system_prompt),
        Message::user(format!(
            "[RECOVERED CONTEXT]\n\n{}\n\n[END RECOVERED CONTEXT]\n\n\
             Please continue the work from where we left off.",
            body.trim()
        )),
    ])
}
