use thiserror::Error;

pub type Result<T> = std::result::Result<T, CitycastError>;

/// Faults raised by the runtime. City lookup misses are never represented
/// here; they travel as [`crate::ToolResult::Error`] values instead.
#[derive(Debug, Error)]
pub enum CitycastError {
    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("environment variable `{variable}` is required but not set")]
    MissingCredential { variable: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
