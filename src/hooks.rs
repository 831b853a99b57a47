use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::ModelCompletion;
use crate::message::{Message, ToolCall};

/// Identifies one `Agent::respond` turn for the hooks observing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub agent: String,
    pub input: String,
}

/// Extension points around each stage of an agent turn.
///
/// Every method has a no-op default. The agent behaves identically whether
/// or not any hook is installed, except where a tool hook returns a value:
/// `before_tool` returning `Some` skips the tool and uses that value as its
/// output, and `after_tool` returning `Some` replaces the output.
#[async_trait]
pub trait AgentHook: Send + Sync {
    async fn before_agent(&self, _run: &RunContext) -> Result<()> {
        Ok(())
    }

    async fn after_agent(&self, _run: &RunContext, _reply: &str) -> Result<()> {
        Ok(())
    }

    async fn before_model(&self, _run: &RunContext, _messages: &[Message]) -> Result<()> {
        Ok(())
    }

    async fn after_model(&self, _run: &RunContext, _completion: &ModelCompletion) -> Result<()> {
        Ok(())
    }

    async fn before_tool(&self, _run: &RunContext, _call: &ToolCall) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn after_tool(
        &self,
        _run: &RunContext,
        _call: &ToolCall,
        _output: &Value,
    ) -> Result<Option<Value>> {
        Ok(None)
    }
}
