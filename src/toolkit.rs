//! Tool adapters exposing the [`ToolDispatcher`] lookups to the agent.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::dispatcher::{CityTool, ToolDispatcher, ToolRequest};
use crate::error::{CitycastError, Result};
use crate::tool::{Tool, ToolRegistry};

/// Registry holding `get_weather` and `get_current_time`, both backed by
/// the given dispatcher.
pub fn city_toolkit(dispatcher: &ToolDispatcher) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in CityTool::ALL {
        registry.register(CityLookupTool {
            tool,
            dispatcher: dispatcher.clone(),
        });
    }
    registry
}

struct CityLookupTool {
    tool: CityTool,
    dispatcher: ToolDispatcher,
}

#[async_trait]
impl Tool for CityLookupTool {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn description(&self) -> &str {
        match self.tool {
            CityTool::GetWeather => {
                "Retrieve the current weather report for a city. Expects {\"city\": string}."
            }
            CityTool::GetCurrentTime => {
                "Return the current local time (HH:MM) in a city. Expects {\"city\": string}."
            }
        }
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "Name of the city, e.g. \"New York\""
                }
            },
            "required": ["city"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let city = input.get("city").and_then(Value::as_str).ok_or_else(|| {
            CitycastError::Protocol(format!("missing `city` for {}", self.tool))
        })?;
        let result = self.dispatcher.dispatch(&ToolRequest::new(self.tool, city));
        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::registry::CityRegistry;

    fn toolkit() -> ToolRegistry {
        city_toolkit(&ToolDispatcher::new(Arc::new(CityRegistry::builtin())))
    }

    #[tokio::test]
    async fn exposes_both_lookups() {
        let tools = toolkit();
        assert_eq!(tools.names(), vec!["get_current_time", "get_weather"]);
        assert!(tools
            .describe()
            .iter()
            .all(|desc| desc.parameters.as_ref().is_some_and(|p| p["required"] == json!(["city"]))));
    }

    #[tokio::test]
    async fn returns_wire_shaped_results() {
        let tools = toolkit();
        let hit = tools
            .call("get_weather", json!({"city": "New York"}))
            .await
            .unwrap();
        assert_eq!(
            hit,
            json!({
                "status": "success",
                "report": "The weather in New York is sunny with a temperature of 45 F."
            })
        );

        let miss = tools
            .call("get_current_time", json!({"city": "Paris"}))
            .await
            .unwrap();
        assert_eq!(miss["status"], "error");
        assert_eq!(
            miss["error_message"],
            "Sorry, I don't have timezone information for Paris."
        );
    }

    #[tokio::test]
    async fn missing_city_argument_is_a_protocol_fault() {
        let tools = toolkit();
        let err = tools
            .call("get_weather", json!({"town": "Tokyo"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing `city` for get_weather"));
    }
}
