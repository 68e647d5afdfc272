use std::collections::BTreeMap;

use async_trait::async_trait;
use huddle_core::CalendarError;
use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolSpec;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    Unknown(String),
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, input: Value) -> Result<String, ToolError>;
}

/// Tools keyed by name. Ordered so the specs offered to the model are stable
/// from one request to the next.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec()).collect()
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        tool.execute(input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{Tool, ToolError, ToolRegistry};
    use crate::llm::ToolSpec;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.name().to_owned(),
                description: "Echo the text argument".to_owned(),
                parameters: json!({ "type": "object", "properties": { "text": { "type": "string" } } }),
            }
        }

        async fn execute(&self, input: Value) -> Result<String, ToolError> {
            input.get("text").and_then(Value::as_str).map(str::to_owned).ok_or_else(|| {
                ToolError::InvalidArguments { tool: "echo".to_owned(), message: "missing text".to_owned() }
            })
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut registry = ToolRegistry::default();
        registry.register(Echo);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.specs()[0].name, "echo");
        let output = registry.execute("echo", json!({ "text": "ping" })).await.expect("echo");
        assert_eq!(output, "ping");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::default();

        assert!(registry.is_empty());
        assert_eq!(
            registry.execute("missing", json!({})).await,
            Err(ToolError::Unknown("missing".to_owned()))
        );
    }
}
