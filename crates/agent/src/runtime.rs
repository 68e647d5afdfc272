use async_trait::async_trait;
use huddle_core::{LlmError, Message};
use tracing::{info, warn};

use crate::llm::{ChatModel, CompletionRequest, LlmClient, ModelTurn, ToolExchange};
use crate::tools::{ToolError, ToolRegistry};

/// Chat model that may consult one registered tool before answering.
///
/// The first completion is offered every tool in the registry. If the model
/// asks for one, it runs once and the final reply comes from a second
/// completion that sees the tool output but is offered no tools.
pub struct AgentRuntime<C> {
    client: C,
    tools: ToolRegistry,
}

impl<C> AgentRuntime<C>
where
    C: LlmClient,
{
    pub fn new(client: C, tools: ToolRegistry) -> Self {
        Self { client, tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

fn tool_failure_text(tool: &str, error: &ToolError) -> String {
    match error {
        ToolError::Calendar(inner) => format!("Error accessing calendar: {inner}"),
        other => format!("Error running tool `{tool}`: {other}"),
    }
}

#[async_trait]
impl<C> ChatModel for AgentRuntime<C>
where
    C: LlmClient,
{
    async fn respond(&self, system: &str, messages: &[Message]) -> Result<String, LlmError> {
        let request = CompletionRequest::new(system, messages.to_vec()).with_tools(self.tools.specs());

        let call = match self.client.complete(&request).await? {
            ModelTurn::Reply(text) => return Ok(text),
            ModelTurn::ToolCall(call) => call,
        };

        let output = match self.tools.execute(&call.name, call.arguments.clone()).await {
            Ok(output) => {
                info!(event_name = "agent.tool.completed", tool = %call.name, "tool call completed");
                output
            }
            Err(error) => {
                warn!(event_name = "agent.tool.failed", tool = %call.name, error = %error, "tool call failed");
                tool_failure_text(&call.name, &error)
            }
        };

        let follow_up = CompletionRequest::new(system, messages.to_vec())
            .with_scratchpad(vec![ToolExchange { call, output }]);
        match self.client.complete(&follow_up).await? {
            ModelTurn::Reply(text) => Ok(text),
            ModelTurn::ToolCall(extra) => Err(LlmError::MalformedResponse(format!(
                "model requested a second tool `{}` in one turn",
                extra.name
            ))),
        }
    }
}
