use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CitycastError, Result};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON schema for the call arguments, if the tool publishes one.
    fn parameters(&self) -> Option<Value> {
        None
    }

    async fn call(&self, input: Value) -> Result<Value>;
}

/// What the model gets to see about a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        self.tools
            .values()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub async fn call(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| CitycastError::ToolNotFound(name.to_string()))?;
        tool.call(input).await.map_err(|err| match err {
            CitycastError::ToolInvocation { .. } => err,
            source => CitycastError::ToolInvocation {
                name: name.to_string(),
                source: Box::new(source),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the provided JSON payload back to the caller."
        }

        async fn call(&self, input: Value) -> Result<Value> {
            Ok(json!({ "echo": input }))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "Always fails."
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Err(CitycastError::Protocol("missing `city`".into()))
        }
    }

    #[tokio::test]
    async fn calls_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let output = registry.call("echo", json!({"a": 1})).await.unwrap();
        assert_eq!(output, json!({"echo": {"a": 1}}));
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.describe()[0].parameters, None);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let registry = ToolRegistry::new();
        let err = registry.call("nope", Value::Null).await.unwrap_err();
        assert!(matches!(err, CitycastError::ToolNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn wraps_tool_failures_with_name() {
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool);
        let err = registry.call("fail", Value::Null).await.unwrap_err();
        assert!(matches!(err, CitycastError::ToolInvocation { ref name, .. } if name == "fail"));
        assert!(err.to_string().contains("missing `city`"));
    }
}
