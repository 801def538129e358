//! The core agent loop of inkloop.
//!
//! The agent follows an **Estimate → Call → Assemble → Dispatch** cycle:
//!
//! 1. **Estimate** the conversation size and compress it when near budget
//! 2. **Call** the model with the conversation and tool schemas, streamed
//! 3. **Assemble** the streamed fragments into one assistant message
//! 4. **Dispatch** each tool call in emission order and append the results
//!
//! The loop continues until the model answers without tool calls, the
//! iteration ceiling is reached, or the run is cancelled. Every exit path
//! attempts a checkpoint so the session can be resumed with `--recover`.

pub mod assembler;
pub mod checkpoint;
pub mod compressor;
pub mod dispatcher;
pub mod loop_runner;
pub mod stream_event;
pub mod token;

pub use assembler::StreamAssembler;
pub use checkpoint::{CheckpointStore, recovery_seed};
pub use compressor::{CompressionResult, ContextCompressor};
pub use dispatcher::{DispatchOutcome, ToolDispatcher, parse_arguments};
pub use loop_runner::{AgentLoop, RunReport, TerminationReason};
pub use stream_event::{AgentStreamEvent, NoopObserver, TurnObserver};
pub use token::{LocalTokenCounter, TokenCounter, TokenEstimator};
