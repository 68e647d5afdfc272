//! OpenAI-compatible `/chat/completions` client. Groq serves the same wire
//! format under `https://api.groq.com/openai/v1`, which is the default base.

use std::time::Duration;

use async_trait::async_trait;
use huddle_core::config::LlmConfig;
use huddle_core::LlmError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{CompletionRequest, LlmClient, ModelTurn, ToolCall};

const ERROR_BODY_PREVIEW_CHARS: usize = 200;

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    temperature: Option<f32>,
    timeout_secs: u64,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Authentication("no api key configured".to_owned()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: completions_endpoint(config.endpoint_base()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelTurn, LlmError> {
        let body = build_request_body(&self.model, self.temperature, request);
        debug!(
            model = %self.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            scratchpad_len = request.scratchpad.len(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LlmError::Timeout { secs: self.timeout_secs }
                } else {
                    LlmError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text));
        }

        parse_completion(&text)
    }
}

fn completions_endpoint(base: &str) -> String {
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

pub(crate) fn build_request_body(
    model: &str,
    temperature: Option<f32>,
    request: &CompletionRequest,
) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1 + request.scratchpad.len() * 2);
    messages.push(json!({ "role": "system", "content": request.system }));
    for message in &request.messages {
        messages.push(json!({ "role": message.role().as_str(), "content": message.content() }));
    }
    for exchange in &request.scratchpad {
        messages.push(json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": [{
                "id": exchange.call.id,
                "type": "function",
                "function": {
                    "name": exchange.call.name,
                    "arguments": exchange.call.arguments.to_string(),
                },
            }],
        }));
        messages.push(json!({
            "role": "tool",
            "tool_call_id": exchange.call.id,
            "content": exchange.output,
        }));
    }

    let mut body = json!({ "model": model, "messages": messages });
    if let Some(temperature) = temperature {
        body["temperature"] = json!(temperature);
    }
    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    },
                })
            })
            .collect();
        body["tool_choice"] = json!("auto");
    }
    body
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

pub(crate) fn parse_completion(body: &str) -> Result<ModelTurn, LlmError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|error| LlmError::MalformedResponse(format!("invalid completion json: {error}")))?;

    let Some(choice) = response.choices.into_iter().next() else {
        return Err(LlmError::MalformedResponse("completion contained no choices".to_owned()));
    };

    if let Some(call) = choice.message.tool_calls.into_iter().next() {
        let arguments = if call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.function.arguments).map_err(|error| {
                LlmError::MalformedResponse(format!(
                    "tool `{}` arguments are not valid json: {error}",
                    call.function.name
                ))
            })?
        };
        return Ok(ModelTurn::ToolCall(ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        }));
    }

    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(ModelTurn::Reply(content)),
        _ => Err(LlmError::MalformedResponse("completion had no content".to_owned())),
    }
}

pub(crate) fn classify_failure(status: u16, body: &str) -> LlmError {
    let message = provider_error_message(body);
    match status {
        401 | 403 => LlmError::Authentication(message),
        429 => LlmError::RateLimited(message),
        _ => LlmError::Api { status, message },
    }
}

fn provider_error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value.get("error").and_then(|error| error.get("message")).and_then(Value::as_str).map(str::to_owned)
    });
    from_json.unwrap_or_else(|| body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect())
}
