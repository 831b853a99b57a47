use std::sync::Arc;

use serde_json::Value;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::dispatcher::ToolResult;
use crate::error::{CitycastError, Result};
use crate::hooks::{AgentHook, RunContext};
use crate::llm::LanguageModel;
use crate::memory::ConversationMemory;
use crate::message::{Message, ToolCall};
use crate::tool::ToolRegistry;

/// An agent that alternates between the language model and registered tools
/// until the model produces a reply.
pub struct Agent<M: LanguageModel> {
    name: String,
    system_prompt: String,
    model: Arc<M>,
    tools: ToolRegistry,
    memory: ConversationMemory,
    max_steps: usize,
    hooks: Vec<Arc<dyn AgentHook>>,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            name: "agent".to_string(),
            system_prompt: "You are a helpful agent.".to_string(),
            model,
            tools: ToolRegistry::new(),
            memory: ConversationMemory::default(),
            max_steps: 6,
            hooks: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Run a single exchange with the agent. Returns the final assistant reply.
    ///
    /// A turn that fails leaves memory exactly as it was before the call.
    pub async fn respond(&mut self, user_input: impl Into<String>) -> Result<String> {
        let run = RunContext {
            run_id: Uuid::new_v4(),
            agent: self.name.clone(),
            input: user_input.into(),
        };
        let span = info_span!("agent_turn", agent = %run.agent, run_id = %run.run_id);
        let checkpoint = self.memory.len();
        let result = self.run_turn(run).instrument(span).await;
        if result.is_err() {
            self.memory.truncate(checkpoint);
        }
        result
    }

    async fn run_turn(&mut self, run: RunContext) -> Result<String> {
        for hook in &self.hooks {
            hook.before_agent(&run).await?;
        }
        self.memory.push(Message::user(run.input.clone()));
        let tools = self.tools.describe();

        for _ in 0..self.max_steps {
            let prompt = self.build_messages();
            for hook in &self.hooks {
                hook.before_model(&run, &prompt).await?;
            }
            let completion = self.model.complete_chat(&prompt, &tools).await?;
            for hook in &self.hooks {
                hook.after_model(&run, &completion).await?;
            }

            if completion.tool_calls.is_empty() {
                let content = completion.content.ok_or_else(|| {
                    CitycastError::Protocol(
                        "model returned neither content nor tool calls".into(),
                    )
                })?;
                self.memory.push(Message::assistant(&content));
                for hook in &self.hooks {
                    hook.after_agent(&run, &content).await?;
                }
                return Ok(content);
            }

            for call in completion.tool_calls {
                let output = self.invoke_tool(&run, &call).await?;
                self.memory.push(Message::tool_call(call.clone()));
                self.memory.push(Message::tool(&call, output));
            }
        }

        Err(CitycastError::Protocol(
            "Agent reached the step limit without returning a response".into(),
        ))
    }

    async fn invoke_tool(&self, run: &RunContext, call: &ToolCall) -> Result<Value> {
        let mut short_circuit = None;
        for hook in &self.hooks {
            if let Some(value) = hook.before_tool(run, call).await? {
                short_circuit = Some(value);
                break;
            }
        }
        let mut output = match short_circuit {
            Some(value) => value,
            None => match self
                .tools
                .call(&call.name, call.arguments.clone())
                .instrument(info_span!("tool", name = %call.name))
                .await
            {
                Ok(value) => value,
                // The tool exists but rejected the call; let the model see why.
                Err(err @ CitycastError::ToolInvocation { .. }) => {
                    warn!(tool = %call.name, %err, "tool invocation failed");
                    serde_json::to_value(ToolResult::error(err.to_string()))?
                }
                Err(err) => return Err(err),
            },
        };
        for hook in &self.hooks {
            if let Some(replacement) = hook.after_tool(run, call, &output).await? {
                output = replacement;
            }
        }
        Ok(output)
    }

    fn build_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.memory.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(self.memory.iter().cloned());
        messages
    }
}
