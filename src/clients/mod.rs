//! Model client abstraction (C3): one sync `complete` entry point over five
//! backends. `Cerebras`, `Gemini`, and `OpenRouter` are not given their own
//! wire protocol - all three speak the OpenAI chat-completions format, so
//! they're routed through [`openai`] with a provider-specific base URL
//! (`cerebras-cloud-sdk` does not resolve in this registry; see DESIGN.md).

pub mod anthropic;
pub mod openai;
pub mod usage;

use crate::config::resolve_api_key;
use crate::error::Result;
use crate::types::{Backend, Message, RlmConfig, Usage};
use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use tokio::runtime::Runtime;
pub use usage::UsageTracker;

fn default_base_url(backend: Backend) -> Option<&'static str> {
    match backend {
        Backend::OpenAi | Backend::Anthropic => None,
        Backend::Cerebras => Some("https://api.cerebras.ai/v1"),
        Backend::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        Backend::OpenRouter => Some("https://openrouter.ai/api/v1"),
    }
}

enum Inner {
    OpenAiCompatible(OpenAIClient<OpenAIConfig>),
    Anthropic(anthropic_sdk::Anthropic),
}

/// A configured connection to one backend, plus the cumulative usage it has
/// accrued across every call made through it.
pub struct ModelClient {
    inner: Inner,
    model: String,
    tracker: UsageTracker,
}

impl ModelClient {
    pub fn new(config: &RlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(config.backend, config.api_key.as_deref())?;
        let base_url = config.base_url.as_deref().or_else(|| default_base_url(config.backend));

        let inner = match config.backend {
            Backend::Anthropic => Inner::Anthropic(anthropic::build_client(&api_key)?),
            Backend::OpenAi | Backend::Cerebras | Backend::Gemini | Backend::OpenRouter => {
                Inner::OpenAiCompatible(openai::build_client(base_url, &api_key))
            }
        };

        Ok(Self { inner, model: config.model.clone(), tracker: UsageTracker::new() })
    }

    /// Run one completion against the full conversation history, blocking
    /// the calling thread via `runtime`.
    pub fn complete(
        &self,
        runtime: &Runtime,
        history: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<(String, Usage)> {
        let (content, usage) = runtime.block_on(async {
            match &self.inner {
                Inner::OpenAiCompatible(client) => {
                    openai::complete(client, &self.model, history, temperature, max_tokens).await
                }
                Inner::Anthropic(client) => {
                    anthropic::complete(client, &self.model, history, temperature, max_tokens).await
                }
            }
        })?;
        self.tracker.record(&self.model, &usage);
        Ok((content, usage))
    }

    /// Same as [`complete`](Self::complete), but calls `on_delta` with each
    /// content chunk as it streams in rather than waiting for the full
    /// response.
    pub fn complete_streaming(
        &self,
        runtime: &Runtime,
        history: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
        on_delta: impl FnMut(&str),
    ) -> Result<(String, Usage)> {
        let (content, usage) = runtime.block_on(async {
            match &self.inner {
                Inner::OpenAiCompatible(client) => {
                    openai::complete_stream(client, &self.model, history, temperature, max_tokens, on_delta)
                        .await
                }
                Inner::Anthropic(client) => {
                    anthropic::complete_stream(client, &self.model, history, temperature, max_tokens, on_delta)
                        .await
                }
            }
        })?;
        self.tracker.record(&self.model, &usage);
        Ok((content, usage))
    }

    pub fn usage_summary(&self) -> crate::types::UsageSummary {
        self.tracker.summary()
    }

    pub fn last_usage(&self) -> Option<(String, Usage)> {
        self.tracker.last_usage()
    }
}
