//! Iteration controller (C4) - the main `Rlm::completion` loop that drives a
//! model through repeated rounds of "write code, see output, decide what's
//! next" until a `FINAL`/`FINAL_VAR` sentinel appears or `max_iterations`
//! runs out.

use crate::clients::ModelClient;
use crate::educational::EducationalEnricher;
use crate::error::Result;
use crate::parsing::{convert_context_for_repl, find_code_blocks, find_final_answer};
use crate::sandbox::{LlmQueryFn, PyO3Repl};
use crate::stream::{stream_iterations, StreamLogger};
use crate::types::{
    CodeBlock, ContextInput, Event, Message, PromptInput, RlmCompletion, RlmConfig, RlmIteration,
    RlmMetadata, Usage,
};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::{debug, info};

fn context_length_hint(context: &ContextInput) -> usize {
    match context {
        ContextInput::Text(s) => s.len(),
        ContextInput::Mapping(m) => m.iter().map(|(k, v)| k.len() + v.to_string().len()).sum(),
        ContextInput::List(items) => items.iter().map(String::len).sum(),
        ContextInput::Messages(msgs) => msgs.iter().map(|m| m.content.len()).sum(),
    }
}

/// Main RLM orchestrator: owns one model client and sandbox runtime, and
/// drives the iterate-until-`FINAL` loop described by `completion`.
pub struct Rlm {
    config: RlmConfig,
    client: Arc<ModelClient>,
    runtime: Arc<Runtime>,
}

impl Rlm {
    /// Build an `Rlm` from `config`, resolving credentials and constructing
    /// the backend client per `config.backend`.
    pub fn new(config: RlmConfig) -> Result<Self> {
        let runtime = Runtime::new()?;
        let client = ModelClient::new(&config)?;
        Ok(Self { config, client: Arc::new(client), runtime: Arc::new(runtime) })
    }

    /// Run a completion, treating `prompt`'s text as both the question and
    /// the sandbox's `context` variable - the common case where there's no
    /// separately-supplied document.
    pub fn completion(&self, prompt: impl Into<PromptInput>) -> Result<RlmCompletion> {
        let prompt = prompt.into();
        let context_payload = match &prompt {
            PromptInput::Text(s) => s.clone(),
            PromptInput::Messages(msgs) => msgs
                .iter()
                .filter(|m| m.role == crate::types::Role::User)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        self.run(prompt, ContextInput::Text(context_payload), None, None)
    }

    /// Run a completion against an explicit `context` payload (string,
    /// mapping, or list), separate from `prompt`'s question text.
    pub fn completion_with_context(
        &self,
        prompt: impl Into<PromptInput>,
        context: impl Into<ContextInput>,
        root_prompt: Option<&str>,
    ) -> Result<RlmCompletion> {
        self.run(prompt.into(), context.into(), root_prompt, None)
    }

    /// Run a completion on a background thread, returning a channel of
    /// [`Event`]s as the run progresses. Consumes `self`: one `Rlm` drives
    /// one streamed run.
    pub fn stream_completion(self, prompt: impl Into<PromptInput>) -> Receiver<Event>
    where
        Self: Sized,
    {
        let prompt = prompt.into();
        stream_iterations(move |logger| {
            let context_payload = match &prompt {
                PromptInput::Text(s) => s.clone(),
                PromptInput::Messages(msgs) => msgs
                    .iter()
                    .filter(|m| m.role == crate::types::Role::User)
                    .map(|m| m.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            if let Err(err) = self.run(prompt, ContextInput::Text(context_payload), None, Some(logger)) {
                logger.log_error(err.to_string());
            }
        })
    }

    fn run(
        &self,
        prompt: PromptInput,
        context: ContextInput,
        root_prompt: Option<&str>,
        logger: Option<&StreamLogger>,
    ) -> Result<RlmCompletion> {
        let start = Instant::now();

        if let Some(logger) = logger {
            logger.log_metadata(RlmMetadata {
                model: self.config.model.clone(),
                provider: self.config.backend.tag().to_string(),
                environment: self.config.environment.clone(),
                max_iterations: self.config.max_iterations,
                start_time: time::OffsetDateTime::now_utc(),
            });
        }

        let system_prompt = crate::prompts::build_system_prompt(context_length_hint(&context));
        let mut history = vec![Message::system(system_prompt)];
        if let Some(root) = root_prompt {
            history.push(Message::user(format!("Original question, for reference: {root}")));
        }
        history.push(Message::user(crate::prompts::build_initial_user_prompt()));

        let client = self.client.clone();
        let runtime = self.runtime.clone();
        let temperature = self.config.temperature;
        let max_tokens = self.config.max_tokens;
        let query_fn: LlmQueryFn = Arc::new(move |sub_prompt: &str| {
            client
                .complete(&runtime, &[Message::user(sub_prompt)], temperature, max_tokens)
                .map_err(|e| e.to_string())
        });

        let repl = PyO3Repl::new(query_fn, self.config.max_batch_concurrency, self.config.fragment_timeout)?;
        let (context_data, context_str) = convert_context_for_repl(context);
        match (context_data, context_str) {
            (Some(data), _) => repl.add_context_data("context", &data)?,
            (_, Some(s)) => repl.add_context("context", &s)?,
            (None, None) => unreachable!("convert_context_for_repl always produces exactly one side"),
        }

        let enricher = EducationalEnricher::new();
        let mut iterations: Vec<RlmIteration> = Vec::new();
        let mut total_usage = Usage::default();

        for iteration_num in 1..=self.config.max_iterations {
            let iter_start = Instant::now();
            let prompt_text = history.last().expect("history always non-empty").content.clone();

            if self.config.exec_log {
                info!(iteration = iteration_num, "starting iteration");
            }

            let (raw_response, usage) = match logger {
                Some(logger) => self.client.complete_streaming(
                    &self.runtime,
                    &history,
                    self.config.temperature,
                    self.config.max_tokens,
                    |chunk| logger.log_token(iteration_num, chunk.to_string()),
                )?,
                None => {
                    self.client.complete(&self.runtime, &history, self.config.temperature, self.config.max_tokens)?
                }
            };
            total_usage.add(&usage);
            if self.config.verbose {
                debug!(iteration = iteration_num, response = %raw_response, "model response");
            }

            let code_blocks_src = find_code_blocks(&raw_response);
            let mut executed_blocks: Vec<CodeBlock> = Vec::new();
            for code in &code_blocks_src {
                let result = repl.execute(code, iteration_num)?;
                if self.config.exec_log {
                    info!(iteration = iteration_num, success = result.success, "executed code block");
                }
                if let Some(logger) = logger {
                    logger.log_code_result(iteration_num, code.clone(), result.clone());
                }
                executed_blocks.push(CodeBlock { code: code.clone(), result: Some(result), retry_count: 0 });
            }

            let mut resolver = |name: &str| repl.resolve_variable(name);
            let final_answer = find_final_answer(&raw_response, Some(&mut resolver));

            let iteration = RlmIteration {
                iteration: iteration_num,
                prompt: prompt_text,
                response: raw_response,
                code_blocks: executed_blocks,
                final_answer: final_answer.clone(),
                iteration_time: iter_start.elapsed(),
            };

            if let Some(logger) = logger {
                let education = enricher.enrich(&iteration);
                logger.log_iteration(iteration.clone(), Some(education));
            }

            if let Some(answer) = final_answer {
                iterations.push(iteration);
                if self.config.exec_log {
                    info!(iteration = iteration_num, "final answer detected");
                }
                if let Some(logger) = logger {
                    logger.signal_complete();
                }
                return Ok(RlmCompletion {
                    prompt,
                    response: answer,
                    iterations,
                    usage: total_usage,
                    execution_time: start.elapsed(),
                });
            }

            history.extend(crate::parsing::format_iteration(&iteration, self.config.max_result_chars));
            history.push(Message::user(crate::prompts::build_continue_prompt(
                iteration_num,
                self.config.max_iterations,
            )));
            iterations.push(iteration);
        }

        // Soft termination: max_iterations exhausted without a FINAL/FINAL_VAR
        // sentinel. Not an error - the last response is returned as the
        // answer; callers can tell the two cases apart via `answered()`.
        let last_response = iterations
            .last()
            .map(|it| it.response.clone())
            .unwrap_or_default();
        if let Some(logger) = logger {
            logger.signal_complete();
        }
        Ok(RlmCompletion {
            prompt,
            response: last_response,
            iterations,
            usage: total_usage,
            execution_time: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Backend;

    #[test]
    fn default_config_has_sane_values() {
        let config = RlmConfig::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.max_exec_retries, 2);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.backend, Backend::OpenAi);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = RlmConfig::new("gpt-4o-mini")
            .with_max_iterations(5)
            .with_max_exec_retries(3)
            .with_temperature(0.5)
            .with_verbose(true);

        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_exec_retries, 3);
        assert_eq!(config.temperature, 0.5);
        assert!(config.verbose);
    }

    #[test]
    fn context_length_hint_sums_list_items() {
        let context = ContextInput::List(vec!["ab".to_string(), "cde".to_string()]);
        assert_eq!(context_length_hint(&context), 5);
    }
}
