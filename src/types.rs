use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// LLM backend provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    OpenAi,
    Anthropic,
    Cerebras,
    Gemini,
    OpenRouter,
}

impl Backend {
    /// Name of the environment variable holding this provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Backend::OpenAi => "OPENAI_API_KEY",
            Backend::Anthropic => "ANTHROPIC_API_KEY",
            Backend::Cerebras => "CEREBRAS_API_KEY",
            Backend::Gemini => "GOOGLE_API_KEY",
            Backend::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Backend::OpenAi => "openai",
            Backend::Anthropic => "anthropic",
            Backend::Cerebras => "cerebras",
            Backend::Gemini => "gemini",
            Backend::OpenRouter => "openrouter",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "openai" => Some(Backend::OpenAi),
            "anthropic" => Some(Backend::Anthropic),
            "cerebras" => Some(Backend::Cerebras),
            "gemini" => Some(Backend::Gemini),
            "openrouter" => Some(Backend::OpenRouter),
            _ => None,
        }
    }
}

/// Token usage for a single call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Cumulative per-model usage counters, reported by a `ModelClient`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelUsageSummary {
    pub total_calls: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

/// Usage across every model a client has called.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub model_usage: HashMap<String, ModelUsageSummary>,
}

/// OpenAI-style message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Prompt can be a single string or a pre-built message list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    Text(String),
    Messages(Vec<Message>),
}

impl From<String> for PromptInput {
    fn from(s: String) -> Self {
        PromptInput::Text(s)
    }
}

impl From<&str> for PromptInput {
    fn from(s: &str) -> Self {
        PromptInput::Text(s.to_string())
    }
}

impl From<Vec<Message>> for PromptInput {
    fn from(m: Vec<Message>) -> Self {
        PromptInput::Messages(m)
    }
}

impl std::fmt::Display for PromptInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptInput::Text(s) => write!(f, "{}", s),
            PromptInput::Messages(msgs) => {
                for msg in msgs {
                    writeln!(f, "[{:?}]: {}", msg.role, msg.content)?;
                }
                Ok(())
            }
        }
    }
}

/// Context handed to the sandbox's `context` variable, coerced per the
/// rules in `parsing::convert_context_for_repl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextInput {
    Text(String),
    Mapping(serde_json::Map<String, serde_json::Value>),
    List(Vec<String>),
    Messages(Vec<ContextMessage>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub content: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<String> for ContextInput {
    fn from(s: String) -> Self {
        ContextInput::Text(s)
    }
}

impl From<&str> for ContextInput {
    fn from(s: &str) -> Self {
        ContextInput::Text(s.to_string())
    }
}

/// Result of a single LM completion call - a "sub-call descriptor" when
/// made from inside the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub prompt: PromptInput,
    pub response: String,
    pub usage: Usage,
    pub execution_time: Duration,
    /// Iteration this sub-call was made during, when known.
    pub parent_iteration: Option<u32>,
}

/// Result of executing one code fragment in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplResult {
    pub stdout: String,
    pub stderr: String,
    pub locals: HashMap<String, String>,
    pub execution_time: Duration,
    pub rlm_calls: Vec<ChatCompletion>,
    pub success: bool,
    pub error: Option<String>,
}

impl ReplResult {
    pub fn success(
        stdout: String,
        locals: HashMap<String, String>,
        execution_time: Duration,
        rlm_calls: Vec<ChatCompletion>,
    ) -> Self {
        Self {
            stdout,
            stderr: String::new(),
            locals,
            execution_time,
            rlm_calls,
            success: true,
            error: None,
        }
    }

    pub fn failure(error: String, stderr: String, execution_time: Duration) -> Self {
        Self {
            stdout: String::new(),
            stderr,
            locals: HashMap::new(),
            execution_time,
            rlm_calls: Vec::new(),
            success: false,
            error: Some(error),
        }
    }
}

/// Extracted code block with its execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub code: String,
    pub result: Option<ReplResult>,
    pub retry_count: u32,
}

impl CodeBlock {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into(), result: None, retry_count: 0 }
    }
}

/// Single iteration of the RLM loop. `iteration` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlmIteration {
    pub iteration: u32,
    pub prompt: String,
    pub response: String,
    pub code_blocks: Vec<CodeBlock>,
    pub final_answer: Option<String>,
    pub iteration_time: Duration,
}

/// Final RLM completion result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlmCompletion {
    pub prompt: PromptInput,
    pub response: String,
    pub iterations: Vec<RlmIteration>,
    pub usage: Usage,
    pub execution_time: Duration,
}

impl RlmCompletion {
    /// Whether the run ended via a detected `FINAL`/`FINAL_VAR`, as opposed
    /// to exhausting `max_iterations` without one.
    pub fn answered(&self) -> bool {
        self.iterations
            .last()
            .is_some_and(|it| it.final_answer.is_some())
    }
}

/// Run-start metadata, emitted once via the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlmMetadata {
    pub model: String,
    pub provider: String,
    pub environment: String,
    pub max_iterations: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: time::OffsetDateTime,
}

/// Configuration for RLM
#[derive(Debug, Clone)]
pub struct RlmConfig {
    pub model: String,
    pub max_iterations: u32,
    pub max_exec_retries: u32,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub verbose: bool,
    /// Show minimal execution progress (iterations, code exec, final)
    pub exec_log: bool,
    pub backend: Backend,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Per-fragment sandbox execution timeout.
    pub fragment_timeout: Duration,
    /// Bound on concurrent sub-calls inside `llm_query_batched`.
    pub max_batch_concurrency: usize,
    /// Character budget for a formatted code-result turn.
    pub max_result_chars: usize,
    /// Identifier surfaced in `RlmMetadata::environment`.
    pub environment: String,
}

impl Default for RlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_iterations: 10,
            max_exec_retries: 2,
            temperature: 0.0,
            max_tokens: None,
            verbose: false,
            exec_log: false,
            backend: Backend::default(),
            base_url: None,
            api_key: None,
            fragment_timeout: Duration::from_secs(30),
            max_batch_concurrency: 8,
            max_result_chars: 25_000,
            environment: "local".to_string(),
        }
    }
}

impl RlmConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), ..Default::default() }
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_max_exec_retries(mut self, n: u32) -> Self {
        self.max_exec_retries = n;
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn with_verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }

    pub fn with_exec_log(mut self, v: bool) -> Self {
        self.exec_log = v;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    pub fn with_max_batch_concurrency(mut self, n: usize) -> Self {
        self.max_batch_concurrency = n.max(1);
        self
    }

    pub fn with_max_result_chars(mut self, n: usize) -> Self {
        self.max_result_chars = n;
        self
    }
}

/// One record in the ordered event stream produced by [`crate::stream::StreamLogger`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Metadata {
        #[serde(with = "time::serde::rfc3339")]
        timestamp: time::OffsetDateTime,
        #[serde(flatten)]
        metadata: RlmMetadata,
    },
    Token {
        iteration: u32,
        content: String,
    },
    CodeResult {
        iteration: u32,
        code: String,
        result: ReplResult,
    },
    Iteration {
        #[serde(flatten)]
        iteration: RlmIteration,
        #[serde(skip_serializing_if = "Option::is_none")]
        education: Option<crate::educational::Education>,
    },
    Error {
        #[serde(with = "time::serde::rfc3339")]
        timestamp: time::OffsetDateTime,
        error: String,
    },
    Complete,
}
