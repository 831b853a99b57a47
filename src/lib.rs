//! A weather, time and directions agent on a small tool-calling runtime.
//!
//! The crate provides:
//! - A deterministic city lookup core (`CityRegistry`, `ToolDispatcher`).
//! - A tool interface (`Tool` and `ToolRegistry`) plus the city toolkit.
//! - An `Agent` that loops between a `LanguageModel` and tools, with
//!   before/after hooks at agent, model and tool level.
//! - An MCP stdio client that brings in the external directions tools.

mod agent;
mod config;
mod context;
mod dispatcher;
mod error;
mod hooks;
mod llm;
pub mod mcp;
mod memory;
mod message;
mod registry;
mod telemetry;
mod tool;
mod toolkit;

pub use agent::Agent;
pub use config::{
    AgentConfig, AppConfig, DirectionsConfig, ModelConfig, ModelProvider, TelemetryConfig,
};
pub use context::AppContext;
pub use dispatcher::{
    CityTool, Clock, FixedClock, SystemClock, ToolDispatcher, ToolRequest, ToolResult,
};
pub use error::{CitycastError, Result};
pub use hooks::{AgentHook, RunContext};
pub use llm::{GeminiClient, KeywordModel, LanguageModel, ModelCompletion, StubModel};
pub use memory::ConversationMemory;
pub use message::{Message, Role, ToolCall, ToolOutput};
pub use registry::{normalize_city_key, CityEntry, CityRegistry};
pub use telemetry::{
    init_tracing, shutdown_tracing, TelemetryCollector, TelemetryEvent, TelemetryHook,
};
pub use tool::{Tool, ToolDescription, ToolRegistry};
pub use toolkit::city_toolkit;
