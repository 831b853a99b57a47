//! Explicit application wiring, performed once at process start.

use std::env;
use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::Agent;
use crate::config::AppConfig;
use crate::dispatcher::ToolDispatcher;
use crate::error::Result;
use crate::hooks::AgentHook;
use crate::llm::LanguageModel;
use crate::mcp::{McpClient, McpTools, StdioTransport};
use crate::registry::CityRegistry;
use crate::telemetry::TelemetryHook;
use crate::tool::ToolRegistry;
use crate::toolkit::city_toolkit;

/// Everything an agent run needs, built in dependency order: city registry,
/// dispatcher, tool registry, the optional directions connector and hooks.
pub struct AppContext {
    config: AppConfig,
    dispatcher: ToolDispatcher,
    tools: ToolRegistry,
    hooks: Vec<Arc<dyn AgentHook>>,
    directions: Option<McpTools<StdioTransport>>,
}

impl AppContext {
    pub async fn build(config: AppConfig) -> Result<Self> {
        let registry = Arc::new(CityRegistry::builtin());
        let dispatcher = ToolDispatcher::new(registry);
        let mut tools = city_toolkit(&dispatcher);

        let directions = match config.directions.connector_env(|key| env::var(key).ok())? {
            Some(child_env) => {
                let transport = StdioTransport::spawn(
                    &config.directions.command,
                    &config.directions.args,
                    child_env,
                )?;
                let mut mcp = McpTools::new(McpClient::new(transport));
                if let Some(prefix) = &config.directions.tool_prefix {
                    mcp = mcp.with_prefix(prefix.clone());
                }
                let count = mcp.register_tools(&mut tools).await?;
                info!(count, "registered directions tools");
                Some(mcp)
            }
            None => {
                if config.directions.enabled {
                    warn!(
                        variable = %config.directions.api_key_source_env,
                        "directions API key not set; continuing without directions"
                    );
                }
                None
            }
        };

        Ok(Self {
            config,
            dispatcher,
            tools,
            hooks: vec![Arc::new(TelemetryHook::new())],
            directions,
        })
    }

    /// Replace the default tracing hook set.
    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn AgentHook>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn has_directions(&self) -> bool {
        self.directions.is_some()
    }

    /// Agent configured from `[agent]` with every registered tool and hook.
    pub fn agent<M: LanguageModel>(&self, model: Arc<M>) -> Agent<M> {
        let agent_cfg = &self.config.agent;
        let mut agent = Agent::new(model)
            .with_name(agent_cfg.name.clone())
            .with_system_prompt(format!("{}\n\n{}", agent_cfg.description, agent_cfg.instruction))
            .with_tools(self.tools.clone())
            .with_max_steps(agent_cfg.max_steps);
        for hook in &self.hooks {
            agent = agent.with_hook(Arc::clone(hook));
        }
        agent
    }

    pub async fn shutdown(self) -> Result<()> {
        if let Some(directions) = self.directions {
            directions.close().await?;
        }
        Ok(())
    }
}
