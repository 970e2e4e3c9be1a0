//! # RLM - Recursive Language Models
//!
//! An inference engine enabling LLMs to recursively decompose tasks
//! via REPL-based code execution.

pub mod clients;
pub mod config;
pub mod educational;
pub mod error;
pub mod file_parser;
pub mod parsing;
pub mod sandbox;
pub mod stream;
pub mod types;

mod prompts;
mod rlm;

// Re-exports
pub use error::{Result, RlmError};
pub use rlm::Rlm;
pub use types::{
    Backend, ChatCompletion, CodeBlock, ContextInput, Event, Message, PromptInput, ReplResult,
    RlmCompletion, RlmConfig, RlmIteration, RlmMetadata, Role, Usage, UsageSummary,
};
