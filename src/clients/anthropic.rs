//! Native Anthropic Messages API completion.
//!
//! Grounded in the teacher's own `call_anthropic`.

use crate::error::{Result, RlmError};
use crate::types::{Message, Role, Usage};
use anthropic_sdk::{Anthropic, ContentBlock, ContentBlockDelta, MessageCreateBuilder, MessageStreamEvent};
use futures::StreamExt;

pub fn build_client(api_key: &str) -> Result<Anthropic> {
    Anthropic::new(api_key).map_err(|e| RlmError::Anthropic(e.to_string()))
}

fn request_builder(
    model: &str,
    history: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
) -> MessageCreateBuilder {
    let system_content = history
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.clone());

    let mut builder = MessageCreateBuilder::new(model, max_tokens.unwrap_or(4096));
    if let Some(system) = system_content {
        builder = builder.system(system);
    }
    if temperature > 0.0 {
        builder = builder.temperature(temperature);
    }
    for msg in history.iter().filter(|m| m.role != Role::System) {
        builder = match msg.role {
            Role::User => builder.user(msg.content.clone()),
            Role::Assistant => builder.assistant(msg.content.clone()),
            Role::System => builder,
        };
    }
    builder
}

pub async fn complete(
    client: &Anthropic,
    model: &str,
    history: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
) -> Result<(String, Usage)> {
    let builder = request_builder(model, history, temperature, max_tokens);

    let response = client
        .messages()
        .create(builder.build())
        .await
        .map_err(|e| RlmError::Anthropic(e.to_string()))?;

    let content = response
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");

    let usage = Usage::new(
        response.usage.input_tokens as u64,
        response.usage.output_tokens as u64,
    );

    Ok((content, usage))
}

/// Same request as [`complete`], but drains the SSE stream event-by-event,
/// invoking `on_delta` with each text fragment as it's produced. Input token
/// usage arrives on `message_start`; output token usage is only final once
/// `message_delta` has been seen for the last time.
pub async fn complete_stream(
    client: &Anthropic,
    model: &str,
    history: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
    mut on_delta: impl FnMut(&str),
) -> Result<(String, Usage)> {
    let builder = request_builder(model, history, temperature, max_tokens);

    let mut stream = client
        .messages()
        .create_stream(builder.build())
        .await
        .map_err(|e| RlmError::Anthropic(e.to_string()))?;

    let mut content = String::new();
    let mut input_tokens = 0u64;
    let mut output_tokens = 0u64;
    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| RlmError::Anthropic(e.to_string()))?;
        match event {
            MessageStreamEvent::MessageStart { message } => {
                input_tokens = message.usage.input_tokens as u64;
            }
            MessageStreamEvent::ContentBlockDelta { delta: ContentBlockDelta::TextDelta { text }, .. } => {
                on_delta(&text);
                content.push_str(&text);
            }
            MessageStreamEvent::MessageDelta { usage, .. } => {
                output_tokens = usage.output_tokens as u64;
            }
            _ => {}
        }
    }

    Ok((content, Usage::new(input_tokens, output_tokens)))
}
