//! Language model abstraction and the providers the agent can run against.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::ModelConfig;
use crate::error::{CitycastError, Result};
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolDescription;

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// The tool-calling orchestrator seam: anything that can turn a transcript
/// into either a reply or a set of tool calls.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> CitycastError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return CitycastError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    CitycastError::LanguageModel(format!("{provider} request failed with {status}: {body}"))
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            CitycastError::LanguageModel("missing Gemini API key in model config".into())
        })?;
        let endpoint = cfg
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|err| CitycastError::LanguageModel(format!("http client error: {err}")))?,
            model: cfg.model.clone(),
            api_key,
            endpoint,
        })
    }

    fn to_request(&self, messages: &[Message], tools: &[ToolDescription]) -> GeminiRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system_instruction = (!system.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(system.join("\n\n"))],
        });

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|message| match (&message.tool_call, &message.tool_output) {
                (Some(call), _) => GeminiContent {
                    role: Some("model".into()),
                    parts: vec![GeminiPart {
                        function_call: Some(GeminiFunctionCall {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..GeminiPart::default()
                    }],
                },
                (_, Some(output)) => GeminiContent {
                    role: Some("user".into()),
                    parts: vec![GeminiPart {
                        function_response: Some(GeminiFunctionResponse {
                            name: output.name.clone(),
                            response: json!({ "name": output.name, "content": output.output }),
                        }),
                        ..GeminiPart::default()
                    }],
                },
                _ => GeminiContent {
                    role: Some(
                        if message.role == Role::Assistant { "model" } else { "user" }.into(),
                    ),
                    parts: vec![GeminiPart::text(message.content.clone())],
                },
            })
            .collect();

        let tools = (!tools.is_empty()).then(|| {
            vec![GeminiTools {
                function_declarations: tools
                    .iter()
                    .map(|tool| GeminiFunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.as_ref().map(sanitize_schema),
                    })
                    .collect(),
            }]
        });

        GeminiRequest {
            system_instruction,
            contents,
            tools,
        }
    }
}

/// Gemini accepts an OpenAPI subset of JSON schema; strip the keys it rejects
/// (MCP servers commonly emit them).
fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), "$schema" | "additionalProperties"))
                .map(|(key, value)| (key.clone(), sanitize_schema(value)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let payload = self.to_request(messages, tools);
        let resp = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.endpoint, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| CitycastError::LanguageModel(format!("Gemini request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "gemini"));
        }

        let parsed: GeminiResponse = resp.json().await.map_err(|err| {
            CitycastError::LanguageModel(format!("Gemini response parse error: {err}"))
        })?;
        Ok(parsed.into_completion())
    }
}

/// Replays scripted directives, one per call. Each entry is either
/// `{"action":"respond","content":..}`, `{"action":"call_tool","name":..,"arguments":..}`
/// or plain text, which is treated as a direct reply.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .map(|locked| locked.len())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond { content: String },
    CallTool { name: String, arguments: Value },
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let raw = {
            let mut locked = self
                .responses
                .lock()
                .map_err(|_| CitycastError::LanguageModel("stub model poisoned".into()))?;
            locked.pop_front().ok_or_else(|| {
                CitycastError::LanguageModel("StubModel ran out of scripted responses".into())
            })?
        };

        match serde_json::from_str::<StubDirective>(&raw) {
            Ok(StubDirective::Respond { content }) => Ok(ModelCompletion {
                content: Some(content),
                tool_calls: Vec::new(),
            }),
            Ok(StubDirective::CallTool { name, arguments }) => Ok(ModelCompletion {
                content: None,
                tool_calls: vec![ToolCall {
                    id: None,
                    name,
                    arguments,
                }],
            }),
            Err(_) => Ok(ModelCompletion {
                content: Some(raw),
                tool_calls: Vec::new(),
            }),
        }
    }
}

/// Rule-based orchestrator for offline use: picks tools from keywords in the
/// latest user message and replies with whatever the tools reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordModel;

impl KeywordModel {
    fn city_in(text: &str) -> Option<&str> {
        // ASCII lowercasing keeps byte offsets valid for `text`.
        let idx = text.to_ascii_lowercase().rfind(" in ")?;
        let city = text[idx + 4..]
            .trim()
            .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!'));
        (!city.is_empty()).then_some(city)
    }

    fn plan(text: &str, tools: &[ToolDescription]) -> Vec<ToolCall> {
        let Some(city) = Self::city_in(text) else {
            return Vec::new();
        };
        let lower = text.to_ascii_lowercase();
        [("weather", "get_weather"), ("time", "get_current_time")]
            .into_iter()
            .filter(|(keyword, tool)| {
                lower.contains(keyword) && tools.iter().any(|t| t.name == *tool)
            })
            .map(|(_, tool)| ToolCall {
                id: None,
                name: tool.to_string(),
                arguments: json!({ "city": city }),
            })
            .collect()
    }
}

#[async_trait]
impl LanguageModel for KeywordModel {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let Some(last) = messages.last() else {
            return Err(CitycastError::LanguageModel("no messages to answer".into()));
        };

        if last.role == Role::Tool {
            let mut reports: Vec<String> = messages
                .iter()
                .rev()
                .take_while(|m| m.role != Role::User)
                .filter_map(|m| m.tool_output.as_ref())
                .map(|out| {
                    out.output
                        .get("report")
                        .or_else(|| out.output.get("error_message"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| out.output.to_string())
                })
                .collect();
            reports.reverse();
            return Ok(ModelCompletion {
                content: Some(reports.join(" ")),
                tool_calls: Vec::new(),
            });
        }

        let tool_calls = Self::plan(&last.content, tools);
        if tool_calls.is_empty() {
            return Ok(ModelCompletion {
                content: Some(
                    "I can tell you the weather or the current time in a city. \
                     Try \"What's the weather in Tokyo?\""
                        .to_string(),
                ),
                tool_calls,
            });
        }
        Ok(ModelCompletion {
            content: None,
            tool_calls,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTools>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiResponse {
    fn into_completion(self) -> ModelCompletion {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        let parts = self
            .candidates
            .into_iter()
            .next()
            .map(|cand| cand.content.parts)
            .unwrap_or_default();
        for part in parts {
            if let Some(t) = part.text {
                text.push(t);
            }
            if let Some(call) = part.function_call {
                tool_calls.push(ToolCall {
                    id: None,
                    name: call.name,
                    arguments: call.args,
                });
            }
        }
        let content = text.concat();
        ModelCompletion {
            content: (!content.is_empty()).then_some(content),
            tool_calls,
        }
    }
}
