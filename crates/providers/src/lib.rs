//! Chat endpoint implementations for inkloop.
//!
//! All providers implement the `inkloop_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
