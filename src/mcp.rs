//! MCP (Model Context Protocol) client used for the directions connector.
//!
//! The directions capability lives in a separate MCP server process. This
//! module launches it, speaks JSON-RPC 2.0 over its stdin/stdout, and wraps
//! each remote tool as a local [`Tool`] so the agent can call it like any
//! other.
//!
//! ```rust,ignore
//! let transport = StdioTransport::spawn("npx", &args, env)?;
//! let tools = McpTools::new(McpClient::new(transport));
//! tools.register_tools(&mut registry).await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use crate::error::{CitycastError, Result};
use crate::tool::{Tool, ToolRegistry};

const PROTOCOL_VERSION: &str = "2024-11-05";

// ─────────────────────────────────────────────────────────────────────────────
// Protocol types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }
}

/// Any message read back from the server. Responses carry `id` plus
/// `result` or `error`; server-initiated notifications carry `method`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpToolDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {},
    #[serde(rename = "resource")]
    Resource { resource: Value },
    /// Content types this client does not render, such as `audio`.
    #[serde(other)]
    Unknown,
}

impl ContentItem {
    fn as_text(&self) -> String {
        match self {
            ContentItem::Text { text } => text.clone(),
            ContentItem::Image { .. } => "[image]".to_string(),
            ContentItem::Resource { resource } => format!("[Resource: {resource}]"),
            ContentItem::Unknown => "[unsupported content]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for the response carrying the same id.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Send a notification; no response is expected.
    async fn notify(&self, notification: JsonRpcRequest) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Launches an MCP server as a subprocess and exchanges newline-delimited
/// JSON over its stdio.
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    request_id: AtomicU64,
}

impl StdioTransport {
    pub fn spawn(command: &str, args: &[String], env: HashMap<String, String>) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            CitycastError::Mcp(format!("Failed to spawn MCP server `{command}`: {e}"))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CitycastError::Mcp("MCP server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CitycastError::Mcp("MCP server stdout not available".into()))?;
        info!(command, ?args, "spawned MCP server");

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            request_id: AtomicU64::new(1),
        })
    }

    async fn write_line(&self, message: &JsonRpcRequest) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CitycastError::Mcp(format!("Failed to write to MCP server: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| CitycastError::Mcp(format!("Failed to flush: {e}")))
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        request.id = Some(id);

        // Hold the reader across write and read so concurrent callers cannot
        // consume each other's responses.
        let mut stdout = self.stdout.lock().await;
        self.write_line(&request).await?;

        loop {
            let mut line = String::new();
            let read = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| CitycastError::Mcp(format!("Failed to read from MCP server: {e}")))?;
            if read == 0 {
                return Err(CitycastError::Mcp("MCP server closed its output".into()));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let message: JsonRpcResponse = match serde_json::from_str(trimmed) {
                Ok(message) => message,
                Err(err) => {
                    debug!(%err, line = trimmed, "skipping non JSON-RPC output");
                    continue;
                }
            };
            if message.id == Some(id) && message.method.is_none() {
                return Ok(message);
            }
            trace!(method = ?message.method, id = ?message.id, "skipping unrelated MCP message");
        }
    }

    async fn notify(&self, mut notification: JsonRpcRequest) -> Result<()> {
        notification.id = None;
        self.write_line(&notification).await
    }

    async fn close(&self) -> Result<()> {
        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            child
                .kill()
                .await
                .map_err(|e| CitycastError::Mcp(format!("Failed to kill MCP server: {e}")))?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

pub struct McpClient<T: McpTransport> {
    transport: T,
    server_info: Option<ServerInfo>,
}

impl<T: McpTransport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            server_info: None,
        }
    }

    fn into_result(response: JsonRpcResponse, method: &str) -> Result<Value> {
        if let Some(error) = response.error {
            return Err(CitycastError::Mcp(format!(
                "{method} failed ({}): {}",
                error.code, error.message
            )));
        }
        Ok(response.result.unwrap_or_default())
    }

    /// Perform the initialize handshake once; later calls return the cached
    /// server info.
    pub async fn initialize(&mut self) -> Result<&ServerInfo> {
        if self.server_info.is_none() {
            let request = JsonRpcRequest::new(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "citycast",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            );
            let response = self.transport.send(request).await?;
            let result: InitializeResult =
                serde_json::from_value(Self::into_result(response, "initialize")?).map_err(
                    |e| CitycastError::Mcp(format!("Failed to parse initialize result: {e}")),
                )?;
            info!(
                server = %result.server_info.name,
                protocol = %result.protocol_version,
                "MCP session initialized"
            );

            self.transport
                .notify(JsonRpcRequest::new("notifications/initialized", None))
                .await?;
            self.server_info = Some(result.server_info);
        }

        self.server_info
            .as_ref()
            .ok_or_else(|| CitycastError::Mcp("Server info not available".into()))
    }

    pub async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>> {
        self.initialize().await?;
        let response = self
            .transport
            .send(JsonRpcRequest::new("tools/list", None))
            .await?;
        let result: ListToolsResult =
            serde_json::from_value(Self::into_result(response, "tools/list")?)
                .map_err(|e| CitycastError::Mcp(format!("Failed to parse tools/list result: {e}")))?;
        Ok(result.tools)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.initialize().await?;
        let response = self
            .transport
            .send(JsonRpcRequest::new(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            ))
            .await?;
        serde_json::from_value(Self::into_result(response, "tools/call")?)
            .map_err(|e| CitycastError::Mcp(format!("Failed to parse tools/call result: {e}")))
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool integration
// ─────────────────────────────────────────────────────────────────────────────

/// Exposes every tool of one MCP server through a [`ToolRegistry`].
pub struct McpTools<T: McpTransport + 'static> {
    client: Arc<Mutex<McpClient<T>>>,
    tool_prefix: Option<String>,
}

impl<T: McpTransport + 'static> McpTools<T> {
    pub fn new(client: McpClient<T>) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            tool_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tool_prefix = Some(prefix.into());
        self
    }

    /// List the server's tools and register a wrapper for each one.
    pub async fn register_tools(&self, registry: &mut ToolRegistry) -> Result<usize> {
        let tools = self.client.lock().await.list_tools().await?;
        let count = tools.len();
        for tool_def in tools {
            let name = match &self.tool_prefix {
                Some(prefix) => format!("{prefix}_{}", tool_def.name),
                None => tool_def.name.clone(),
            };
            let description = tool_def
                .description
                .unwrap_or_else(|| format!("MCP tool: {}", tool_def.name));
            debug!(tool = %name, "registering MCP tool");
            registry.register(McpToolWrapper {
                name,
                description,
                parameters: tool_def.input_schema,
                client: Arc::clone(&self.client),
                mcp_tool_name: tool_def.name,
            });
        }
        Ok(count)
    }

    pub async fn close(&self) -> Result<()> {
        self.client.lock().await.close().await
    }
}

struct McpToolWrapper<T: McpTransport + 'static> {
    name: String,
    description: String,
    parameters: Value,
    client: Arc<Mutex<McpClient<T>>>,
    mcp_tool_name: String,
}

#[async_trait]
impl<T: McpTransport + 'static> Tool for McpToolWrapper<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Option<Value> {
        (!self.parameters.is_null()).then(|| self.parameters.clone())
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let result = self
            .client
            .lock()
            .await
            .call_tool(&self.mcp_tool_name, input)
            .await?;
        let text = result
            .content
            .iter()
            .map(ContentItem::as_text)
            .collect::<Vec<_>>()
            .join("\n");

        // Same two-status shape as the local city tools.
        if result.is_error {
            Ok(json!({ "status": "error", "error_message": text }))
        } else {
            Ok(json!({ "status": "success", "report": text }))
        }
    }
}
