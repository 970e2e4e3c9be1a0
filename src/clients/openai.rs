//! OpenAI-wire-compatible chat completions, shared by the `OpenAi`,
//! `Cerebras`, `Gemini`, and `OpenRouter` backends - all four speak the same
//! chat-completions protocol, so they share one client type keyed only by
//! base URL.
//!
//! Grounded in the teacher's own `call_openai`.

use crate::error::Result;
use crate::types::{Message, Role, Usage};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionStreamOptions, CreateChatCompletionRequestArgs,
    },
    Client as OpenAIClient,
};
use futures::StreamExt;

pub fn build_client(base_url: Option<&str>, api_key: &str) -> OpenAIClient<OpenAIConfig> {
    let mut config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(url) = base_url {
        config = config.with_api_base(url);
    }
    OpenAIClient::with_config(config)
}

fn request_messages(history: &[Message]) -> Vec<ChatCompletionRequestMessage> {
    history
        .iter()
        .map(|m| match m.role {
            Role::System => ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .expect("system message builder never fails"),
            ),
            Role::User => ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .expect("user message builder never fails"),
            ),
            Role::Assistant => ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .expect("assistant message builder never fails"),
            ),
        })
        .collect()
}

pub async fn complete(
    client: &OpenAIClient<OpenAIConfig>,
    model: &str,
    history: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
) -> Result<(String, Usage)> {
    let mut request_builder = CreateChatCompletionRequestArgs::default();
    request_builder.model(model).messages(request_messages(history)).temperature(temperature);
    if let Some(max_tokens) = max_tokens {
        request_builder.max_tokens(max_tokens);
    }
    let request = request_builder.build()?;

    let response = client.chat().create(request).await?;

    let content = response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default();

    let usage = response
        .usage
        .map(|u| Usage::new(u.prompt_tokens as u64, u.completion_tokens as u64))
        .unwrap_or_default();

    Ok((content, usage))
}

/// Same request as [`complete`], but drains the response as it streams in,
/// invoking `on_delta` with each non-empty content chunk as soon as the
/// server produces it. Usage is only carried on the final chunk (requires
/// `stream_options.include_usage`), so it's accumulated as chunks arrive.
pub async fn complete_stream(
    client: &OpenAIClient<OpenAIConfig>,
    model: &str,
    history: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
    mut on_delta: impl FnMut(&str),
) -> Result<(String, Usage)> {
    let mut request_builder = CreateChatCompletionRequestArgs::default();
    request_builder
        .model(model)
        .messages(request_messages(history))
        .temperature(temperature)
        .stream_options(ChatCompletionStreamOptions { include_usage: true });
    if let Some(max_tokens) = max_tokens {
        request_builder.max_tokens(max_tokens);
    }
    let request = request_builder.build()?;

    let mut stream = client.chat().create_stream(request).await?;

    let mut content = String::new();
    let mut usage = Usage::default();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.choices.first().and_then(|c| c.delta.content.as_deref()) {
            if !delta.is_empty() {
                on_delta(delta);
                content.push_str(delta);
            }
        }
        if let Some(u) = chunk.usage {
            usage = Usage::new(u.prompt_tokens as u64, u.completion_tokens as u64);
        }
    }

    Ok((content, usage))
}
