//! Chat-completions HTTP backend with a forced function call.
//!
//! The request carries one user message and a single function whose
//! parameters are the output schema; `tool_choice` forces the model to call
//! it. Each returned choice contributes the function-call arguments string.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::CodegenError;
use crate::io::completion::{Completion, CompletionRequest, CompletionService};

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// OpenAI-compatible chat-completions backend.
#[derive(Debug, Clone)]
pub struct OpenAiCompletion {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompletion {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Build from the environment variable named in the config.
    pub fn from_env(api_key_env: &str, base_url: &str, model: &str) -> Result<Self> {
        let api_key = std::env::var(api_key_env)
            .with_context(|| format!("{api_key_env} is not set"))?;
        Self::new(api_key, base_url, model)
    }

    fn to_chat_request(&self, request: &CompletionRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            tools: vec![ChatTool {
                tool_type: "function".to_string(),
                function: ChatFunction {
                    name: request.schema.name.to_string(),
                    description: request.schema.description.to_string(),
                    parameters: request.schema.schema.clone(),
                },
            }],
            tool_choice: ToolChoice {
                tool_type: "function".to_string(),
                function: ToolChoiceFunction {
                    name: request.schema.name.to_string(),
                },
            },
        }
    }
}

impl CompletionService for OpenAiCompletion {
    #[instrument(skip_all, fields(model = %self.model, schema = request.schema.name, timeout_secs = request.timeout.as_secs()))]
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let url = format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH);
        let body = self.to_chat_request(request);

        debug!(prompt_bytes = request.prompt.len(), "sending chat completion");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|err| timeout_to_api(err, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            warn!(%status, "chat completion failed");
            return Err(anyhow!("chat completion returned {status}: {}", text.trim()));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|err| timeout_to_api(err, request.timeout))?;
        let completion = completion_from_response(parsed, request.schema.name);
        debug!(choices = completion.choices.len(), "chat completion received");
        Ok(completion)
    }
}

fn timeout_to_api(err: reqwest::Error, timeout: Duration) -> anyhow::Error {
    if err.is_timeout() {
        warn!(timeout_secs = timeout.as_secs(), "chat completion timed out");
        return CodegenError::backend(format!("chat completion timed out after {timeout:?}"))
            .into();
    }
    anyhow::Error::new(err).context("send chat completion request")
}

/// Collect the function-call arguments of every choice.
///
/// A choice without a matching call contributes an empty string, which the
/// caller's decoder rejects as malformed.
fn completion_from_response(response: ChatResponse, function: &str) -> Completion {
    let choices = response
        .choices
        .into_iter()
        .map(|choice| {
            let message = choice.message;
            message
                .tool_calls
                .into_iter()
                .flatten()
                .map(|call| call.function)
                .chain(message.function_call)
                .find(|call| call.name.as_deref().is_none_or(|name| name == function))
                .map(|call| call.arguments)
                .unwrap_or_default()
        })
        .collect();
    Completion { choices }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    tools: Vec<ChatTool>,
    tool_choice: ToolChoice,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    tool_type: String,
    function: ToolChoiceFunction,
}

#[derive(Debug, Serialize)]
struct ToolChoiceFunction {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
    /// Legacy single function call.
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: String,
}
