use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CitycastError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_agent_description")]
    pub description: String,
    #[serde(default = "default_instruction")]
    pub instruction: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description: default_agent_description(),
            instruction: default_instruction(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_agent_name() -> String {
    "weather_time_city_agent".into()
}

fn default_agent_description() -> String {
    "Agent to answer questions about the time and weather in a city and \
     provide directions between two cities."
        .into()
}

fn default_instruction() -> String {
    "You are a helpful assistant. When the user asks for a specific city, use the \
     'get_weather' and the 'get_current_time' tools to find the weather and current \
     time information. If the tools return an error, inform the user. If the tools \
     are successful, present the report clearly."
        .into()
}

fn default_max_steps() -> usize {
    6
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Gemini,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            model: default_model(),
            api_key: None,
            endpoint: None,
        }
    }
}

fn default_model() -> String {
    "gemini-2.0-flash-lite".into()
}

/// Launch parameters for the directions MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_directions_command")]
    pub command: String,
    #[serde(default = "default_directions_args")]
    pub args: Vec<String>,
    /// Variable read from this process's environment.
    #[serde(default = "default_api_key_source_env")]
    pub api_key_source_env: String,
    /// Variable the key is exported as for the child process.
    #[serde(default = "default_api_key_target_env")]
    pub api_key_target_env: String,
    #[serde(default = "default_true")]
    pub require_api_key: bool,
    #[serde(default)]
    pub tool_prefix: Option<String>,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_directions_command(),
            args: default_directions_args(),
            api_key_source_env: default_api_key_source_env(),
            api_key_target_env: default_api_key_target_env(),
            require_api_key: true,
            tool_prefix: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_directions_command() -> String {
    "npx".into()
}

fn default_directions_args() -> Vec<String> {
    vec![
        "-y".into(),
        "@modelcontextprotocol/server-google-maps".into(),
    ]
}

fn default_api_key_source_env() -> String {
    "GOOGLE_MAPS_PLATFORM_API_KEY".into()
}

fn default_api_key_target_env() -> String {
    "GOOGLE_MAPS_API_KEY".into()
}

impl DirectionsConfig {
    /// Environment for the child process.
    ///
    /// `Ok(None)` means the connector should be skipped: it is disabled, or
    /// the key is absent and `require_api_key` is off. An absent key with
    /// `require_api_key` on is a `MissingCredential` error.
    pub fn connector_env(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<HashMap<String, String>>> {
        if !self.enabled {
            return Ok(None);
        }
        match lookup(&self.api_key_source_env).filter(|key| !key.is_empty()) {
            Some(key) => Ok(Some(HashMap::from([(
                self.api_key_target_env.clone(),
                key,
            )]))),
            None if self.require_api_key => Err(CitycastError::MissingCredential {
                variable: self.api_key_source_env.clone(),
            }),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_filter: default_log_filter(),
            json: false,
            otlp_endpoint: None,
        }
    }
}

fn default_service_name() -> String {
    "citycast".into()
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub directions: DirectionsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| CitycastError::Config(format!("Failed to parse configuration: {err}")))
    }

    /// Load `path` if given (defaults otherwise) and apply `CITYCAST_*`
    /// overrides from the process environment.
    pub fn from_env_or_file(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env_overrides(|key| env::var(key).ok());
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("CITYCAST_MODEL") {
            self.model.model = model;
        }
        if let Some(provider) = lookup("CITYCAST_MODEL_PROVIDER") {
            match provider.to_ascii_lowercase().as_str() {
                "gemini" => self.model.provider = ModelProvider::Gemini,
                "keyword" => self.model.provider = ModelProvider::Keyword,
                _ => {}
            }
        }
        if let Some(key) = lookup("CITYCAST_API_KEY") {
            self.model.api_key = Some(key);
        } else if self.model.api_key.is_none() {
            self.model.api_key = lookup("GOOGLE_API_KEY");
        }
        if let Some(endpoint) = lookup("CITYCAST_MODEL_ENDPOINT") {
            self.model.endpoint = Some(endpoint);
        }
        if let Some(steps) = lookup("CITYCAST_MAX_STEPS") {
            if let Ok(parsed) = steps.parse::<usize>() {
                self.agent.max_steps = parsed.max(1);
            }
        }
        if let Some(enabled) = lookup("CITYCAST_DIRECTIONS_ENABLED") {
            if let Ok(parsed) = enabled.parse::<bool>() {
                self.directions.enabled = parsed;
            }
        }
        if let Some(filter) = lookup("CITYCAST_LOG") {
            self.telemetry.log_filter = filter;
        }
        if let Some(json) = lookup("CITYCAST_LOG_JSON") {
            if let Ok(parsed) = json.parse::<bool>() {
                self.telemetry.json = parsed;
            }
        }
        if let Some(endpoint) = lookup("CITYCAST_OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = Some(endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_stock_agent() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.name, "weather_time_city_agent");
        assert_eq!(cfg.model.model, "gemini-2.0-flash-lite");
        assert_eq!(cfg.directions.command, "npx");
        assert_eq!(
            cfg.directions.args,
            vec!["-y", "@modelcontextprotocol/server-google-maps"]
        );
        assert!(cfg.directions.require_api_key);
    }

    #[test]
    fn loads_and_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[agent]\nmax_steps=3\n[model]\nprovider='keyword'\n[directions]\nenabled=false"
        )
        .unwrap();

        let mut cfg = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.agent.max_steps, 3);
        assert_eq!(cfg.model.provider, ModelProvider::Keyword);
        assert!(!cfg.directions.enabled);
        assert_eq!(cfg.agent.name, "weather_time_city_agent");

        cfg.apply_env_overrides(env_of(&[
            ("CITYCAST_MAX_STEPS", "9"),
            ("CITYCAST_DIRECTIONS_ENABLED", "true"),
            ("GOOGLE_API_KEY", "g-key"),
            ("CITYCAST_LOG_JSON", "true"),
        ]));
        assert_eq!(cfg.agent.max_steps, 9);
        assert!(cfg.directions.enabled);
        assert_eq!(cfg.model.api_key.as_deref(), Some("g-key"));
        assert!(cfg.telemetry.json);
    }

    #[test]
    fn explicit_key_beats_google_fallback() {
        let mut cfg = AppConfig::default();
        cfg.apply_env_overrides(env_of(&[
            ("CITYCAST_API_KEY", "explicit"),
            ("GOOGLE_API_KEY", "fallback"),
        ]));
        assert_eq!(cfg.model.api_key.as_deref(), Some("explicit"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = AppConfig::from_toml("[agent\nname=").unwrap_err();
        assert!(matches!(err, CitycastError::Config(_)));
    }

    #[test]
    fn connector_env_maps_key_to_child_variable() {
        let cfg = DirectionsConfig::default();
        let env = cfg
            .connector_env(env_of(&[("GOOGLE_MAPS_PLATFORM_API_KEY", "maps-key")]))
            .unwrap()
            .unwrap();
        assert_eq!(env.get("GOOGLE_MAPS_API_KEY").map(String::as_str), Some("maps-key"));
    }

    #[test]
    fn missing_key_fails_fast_unless_optional() {
        let cfg = DirectionsConfig::default();
        let err = cfg.connector_env(env_of(&[])).unwrap_err();
        assert!(matches!(
            err,
            CitycastError::MissingCredential { ref variable } if variable == "GOOGLE_MAPS_PLATFORM_API_KEY"
        ));

        let optional = DirectionsConfig {
            require_api_key: false,
            ..DirectionsConfig::default()
        };
        assert!(optional
            .connector_env(env_of(&[("GOOGLE_MAPS_PLATFORM_API_KEY", "")]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn disabled_connector_needs_no_key() {
        let cfg = DirectionsConfig {
            enabled: false,
            ..DirectionsConfig::default()
        };
        assert!(cfg.connector_env(env_of(&[])).unwrap().is_none());
    }
}
