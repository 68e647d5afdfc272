use std::sync::Arc;

use async_trait::async_trait;
use huddle_core::{LlmError, Message};
use serde_json::Value;

/// A tool the model may ask for, described the way chat-completion APIs
/// expect: a name, a description, and a JSON schema for the arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool call the model made during the current turn together with what the
/// tool returned.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolExchange {
    pub call: ToolCall,
    pub output: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub scratchpad: Vec<ToolExchange>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, messages: Vec<Message>) -> Self {
        Self { system: system.into(), messages, tools: Vec::new(), scratchpad: Vec::new() }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_scratchpad(mut self, scratchpad: Vec<ToolExchange>) -> Self {
        self.scratchpad = scratchpad;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelTurn {
    Reply(String),
    ToolCall(ToolCall),
}

/// Raw chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelTurn, LlmError>;
}

#[async_trait]
impl<T> LlmClient for Arc<T>
where
    T: LlmClient + ?Sized,
{
    fn model(&self) -> &str {
        (**self).model()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelTurn, LlmError> {
        (**self).complete(request).await
    }
}

/// What the dispatcher talks to: a system instruction plus the ordered
/// conversation in, reply text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn respond(&self, system: &str, messages: &[Message]) -> Result<String, LlmError>;
}

/// Plain chat with no tools offered.
pub struct DirectChat<C> {
    client: C,
}

impl<C> DirectChat<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> ChatModel for DirectChat<C>
where
    C: LlmClient,
{
    async fn respond(&self, system: &str, messages: &[Message]) -> Result<String, LlmError> {
        let request = CompletionRequest::new(system, messages.to_vec());
        match self.client.complete(&request).await? {
            ModelTurn::Reply(text) => Ok(text),
            ModelTurn::ToolCall(call) => Err(LlmError::MalformedResponse(format!(
                "model requested tool `{}` but no tools were offered",
                call.name
            ))),
        }
    }
}
