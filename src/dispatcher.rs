//! Deterministic resolution of the `get_weather` and `get_current_time` tools.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CitycastError, Result};
use crate::registry::CityRegistry;

/// Outcome of a city tool call, in the shape callers expect on the wire:
/// `{"status":"success","report":..}` or `{"status":"error","error_message":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success {
        report: String,
    },
    Error {
        #[serde(rename = "error_message")]
        message: String,
    },
}

impl ToolResult {
    pub fn success(report: impl Into<String>) -> Self {
        Self::Success {
            report: report.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The report or error message, whichever this result carries.
    pub fn text(&self) -> &str {
        match self {
            Self::Success { report } => report,
            Self::Error { message } => message,
        }
    }
}

/// The two lookups the dispatcher knows how to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CityTool {
    GetWeather,
    GetCurrentTime,
}

impl CityTool {
    pub const ALL: [CityTool; 2] = [CityTool::GetWeather, CityTool::GetCurrentTime];

    pub fn name(self) -> &'static str {
        match self {
            CityTool::GetWeather => "get_weather",
            CityTool::GetCurrentTime => "get_current_time",
        }
    }
}

impl fmt::Display for CityTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CityTool {
    type Err = CitycastError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "get_weather" => Ok(CityTool::GetWeather),
            "get_current_time" => Ok(CityTool::GetCurrentTime),
            other => Err(CitycastError::ToolNotFound(other.to_string())),
        }
    }
}

/// A single invocation as produced by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    #[serde(rename = "tool_name")]
    pub tool: CityTool,
    pub city: String,
}

impl ToolRequest {
    pub fn new(tool: CityTool, city: impl Into<String>) -> Self {
        Self {
            tool,
            city: city.into(),
        }
    }

    /// Build a request from a tool name, failing with `ToolNotFound` for
    /// anything other than the two city tools.
    pub fn parse(tool_name: &str, city: impl Into<String>) -> Result<Self> {
        Ok(Self::new(tool_name.parse()?, city))
    }
}

/// Source of the current instant, swappable so time reports can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Answers city tool calls from a shared [`CityRegistry`].
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<CityRegistry>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("cities", &self.registry.keys())
            .finish()
    }
}

impl ToolDispatcher {
    pub fn new(registry: Arc<CityRegistry>) -> Self {
        Self {
            registry,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dispatch(&self, request: &ToolRequest) -> ToolResult {
        match request.tool {
            CityTool::GetWeather => self.get_weather(&request.city),
            CityTool::GetCurrentTime => self.get_current_time(&request.city),
        }
    }

    pub fn get_weather(&self, city: &str) -> ToolResult {
        info!(tool = "get_weather", city, "tool invoked");
        match self.registry.weather_report(city) {
            Some(report) => ToolResult::success(report),
            None => {
                debug!(tool = "get_weather", city, "no weather entry");
                ToolResult::error(format!(
                    "Sorry, I don't have weather information for '{city}'."
                ))
            }
        }
    }

    pub fn get_current_time(&self, city: &str) -> ToolResult {
        info!(tool = "get_current_time", city, "tool invoked");
        let Some(tz) = self.registry.timezone(city) else {
            debug!(tool = "get_current_time", city, "no timezone entry");
            return ToolResult::error(format!(
                "Sorry, I don't have timezone information for {city}."
            ));
        };
        let local = self.clock.now().with_timezone(&tz);
        ToolResult::success(format!(
            "The current time in {city} is {}",
            local.format("%H:%M")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn dispatcher_at(instant: DateTime<Utc>) -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(CityRegistry::builtin()))
            .with_clock(Arc::new(FixedClock(instant)))
    }

    #[test]
    fn weather_for_known_cities() {
        let dispatcher = ToolDispatcher::new(Arc::new(CityRegistry::builtin()));
        assert_eq!(
            dispatcher.get_weather("London"),
            ToolResult::success("It's cloudy in London with a temperature of 55 F.")
        );
        assert_eq!(
            dispatcher.get_weather("  NewYork "),
            dispatcher.get_weather("new york")
        );
    }

    #[test]
    fn weather_miss_quotes_raw_input() {
        let dispatcher = ToolDispatcher::new(Arc::new(CityRegistry::builtin()));
        assert_eq!(
            dispatcher.get_weather(" Paris "),
            ToolResult::error("Sorry, I don't have weather information for ' Paris '.")
        );
    }

    #[test]
    fn time_is_rendered_in_city_zone() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 23, 5, 0).unwrap();
        let dispatcher = dispatcher_at(instant);

        assert_eq!(
            dispatcher.get_current_time("Tokyo"),
            ToolResult::success("The current time in Tokyo is 08:05")
        );
        assert_eq!(
            dispatcher.get_current_time("london"),
            ToolResult::success("The current time in london is 23:05")
        );
        assert_eq!(
            dispatcher.get_current_time("New York"),
            ToolResult::success("The current time in New York is 18:05")
        );
    }

    #[test]
    fn time_follows_daylight_saving() {
        let summer = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let dispatcher = dispatcher_at(summer);
        assert_eq!(
            dispatcher.get_current_time("London").text(),
            "The current time in London is 13:00"
        );
    }

    #[test]
    fn time_miss_has_unquoted_city() {
        let dispatcher = ToolDispatcher::new(Arc::new(CityRegistry::builtin()));
        assert_eq!(
            dispatcher.get_current_time("Atlantis"),
            ToolResult::error("Sorry, I don't have timezone information for Atlantis.")
        );
    }

    #[test]
    fn empty_city_is_always_an_error() {
        let dispatcher = ToolDispatcher::new(Arc::new(CityRegistry::builtin()));
        assert!(!dispatcher.get_weather("").is_success());
        assert!(!dispatcher.get_current_time("").is_success());
        assert!(!dispatcher.get_weather("   ").is_success());
    }

    #[test]
    fn dispatch_routes_by_tool() {
        let dispatcher = ToolDispatcher::new(Arc::new(CityRegistry::builtin()));
        let request = ToolRequest::parse("get_weather", "tokyo").unwrap();
        assert_eq!(
            dispatcher.dispatch(&request).text(),
            "Tokyo is experiencing light rain and a temperature of 72 F."
        );
        assert!(matches!(
            ToolRequest::parse("get_directions", "tokyo"),
            Err(CitycastError::ToolNotFound(name)) if name == "get_directions"
        ));
    }

    #[test]
    fn serializes_to_wire_shape() {
        assert_eq!(
            serde_json::to_value(ToolResult::success("ok")).unwrap(),
            json!({"status": "success", "report": "ok"})
        );
        assert_eq!(
            serde_json::to_value(ToolResult::error("nope")).unwrap(),
            json!({"status": "error", "error_message": "nope"})
        );
        let parsed: ToolRequest =
            serde_json::from_value(json!({"tool_name": "get_current_time", "city": "Tokyo"}))
                .unwrap();
        assert_eq!(parsed, ToolRequest::new(CityTool::GetCurrentTime, "Tokyo"));
    }
}
