//! Logging setup and the tracing hook attached to every agent turn.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::TelemetryConfig;
use crate::error::{CitycastError, Result};
use crate::hooks::{AgentHook, RunContext};
use crate::llm::ModelCompletion;
use crate::message::{Message, ToolCall};

/// Install the global subscriber: env filter, fmt (plain or JSON) on stderr,
/// and an OTLP exporter when built with `telemetry` and an endpoint is set.
pub fn init_tracing(cfg: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&cfg.log_filter)
        .map_err(|err| CitycastError::Config(format!("invalid log filter: {err}")))?;

    let fmt_layer = if cfg.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    #[cfg(feature = "telemetry")]
    let otel_layer = match cfg.otlp_endpoint.as_deref() {
        Some(endpoint) => Some(
            tracing_opentelemetry::layer().with_tracer(otlp_tracer(&cfg.service_name, endpoint)?),
        ),
        None => None,
    };
    #[cfg(not(feature = "telemetry"))]
    let otel_layer: Option<tracing_subscriber::layer::Identity> = None;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|err| CitycastError::Config(format!("failed to install subscriber: {err}")))?;

    if cfg!(not(feature = "telemetry")) && cfg.otlp_endpoint.is_some() {
        warn!("OTLP endpoint configured but built without the `telemetry` feature");
    }
    Ok(())
}

#[cfg(feature = "telemetry")]
fn otlp_tracer(service_name: &str, endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
            opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                service_name.to_string(),
            )]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .map_err(|err| CitycastError::Config(format!("failed to install OTLP exporter: {err}")))
}

/// Flush pending spans. A no-op without the `telemetry` feature.
pub fn shutdown_tracing() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub kind: String,
    pub run_id: Option<String>,
    pub timestamp: SystemTime,
    pub detail: Value,
}

/// In-memory sink for hook events.
#[derive(Default, Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl TelemetryCollector {
    fn events(&self) -> MutexGuard<'_, Vec<TelemetryEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, kind: impl Into<String>, run: Option<&RunContext>, detail: Value) {
        self.events().push(TelemetryEvent {
            kind: kind.into(),
            run_id: run.map(|r| r.run_id.to_string()),
            timestamp: SystemTime::now(),
            detail,
        });
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events().iter().map(|e| e.kind.clone()).collect()
    }

    pub fn drain(&self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut *self.events())
    }
}

/// Emits a `tracing` event for every callback and, when a collector is
/// attached, records it there as well.
#[derive(Default, Clone)]
pub struct TelemetryHook {
    collector: Option<TelemetryCollector>,
}

impl TelemetryHook {
    pub fn new() -> Self {
        Self { collector: None }
    }

    pub fn with_collector(mut self, collector: TelemetryCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    fn record(&self, kind: &str, run: &RunContext, detail: Value) {
        if let Some(collector) = &self.collector {
            collector.record(kind, Some(run), detail);
        }
    }
}

#[async_trait]
impl AgentHook for TelemetryHook {
    async fn before_agent(&self, run: &RunContext) -> Result<()> {
        info!(run_id = %run.run_id, agent = %run.agent, "agent turn started");
        self.record("before_agent", run, json!({ "input": run.input }));
        Ok(())
    }

    async fn after_agent(&self, run: &RunContext, reply: &str) -> Result<()> {
        info!(run_id = %run.run_id, agent = %run.agent, "agent turn finished");
        self.record("after_agent", run, json!({ "reply": reply }));
        Ok(())
    }

    async fn before_model(&self, run: &RunContext, messages: &[Message]) -> Result<()> {
        debug!(run_id = %run.run_id, messages = messages.len(), "model request");
        self.record("before_model", run, json!({ "messages": messages.len() }));
        Ok(())
    }

    async fn after_model(&self, run: &RunContext, completion: &ModelCompletion) -> Result<()> {
        debug!(
            run_id = %run.run_id,
            tool_calls = completion.tool_calls.len(),
            has_content = completion.content.is_some(),
            "model response"
        );
        self.record(
            "after_model",
            run,
            json!({
                "tool_calls": completion.tool_calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "content": completion.content,
            }),
        );
        Ok(())
    }

    async fn before_tool(&self, run: &RunContext, call: &ToolCall) -> Result<Option<Value>> {
        info!(run_id = %run.run_id, tool = %call.name, args = %call.arguments, "tool call");
        self.record(
            "before_tool",
            run,
            json!({ "tool": call.name, "arguments": call.arguments }),
        );
        Ok(None)
    }

    async fn after_tool(
        &self,
        run: &RunContext,
        call: &ToolCall,
        output: &Value,
    ) -> Result<Option<Value>> {
        if output.get("status").and_then(Value::as_str) == Some("error") {
            warn!(run_id = %run.run_id, tool = %call.name, output = %output, "tool reported an error");
        } else {
            debug!(run_id = %run.run_id, tool = %call.name, output = %output, "tool result");
        }
        self.record(
            "after_tool",
            run,
            json!({ "tool": call.name, "output": output }),
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn run() -> RunContext {
        RunContext {
            run_id: Uuid::new_v4(),
            agent: "test".into(),
            input: "hi".into(),
        }
    }

    #[tokio::test]
    async fn hook_records_into_collector() {
        let collector = TelemetryCollector::default();
        let hook = TelemetryHook::new().with_collector(collector.clone());
        let run = run();
        let call = ToolCall {
            id: None,
            name: "get_weather".into(),
            arguments: json!({"city": "Tokyo"}),
        };

        hook.before_agent(&run).await.unwrap();
        assert_eq!(hook.before_tool(&run, &call).await.unwrap(), None);
        assert_eq!(
            hook.after_tool(&run, &call, &json!({"status": "error"}))
                .await
                .unwrap(),
            None
        );

        assert_eq!(
            collector.kinds(),
            vec!["before_agent", "before_tool", "after_tool"]
        );
        let drained = collector.drain();
        assert_eq!(drained[1].detail["tool"], "get_weather");
        assert_eq!(drained[0].run_id, Some(run.run_id.to_string()));
        assert!(collector.drain().is_empty());
    }

    #[test]
    fn rejects_bad_filter() {
        let cfg = TelemetryConfig {
            log_filter: "citycast=loud".into(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(init_tracing(&cfg), Err(CitycastError::Config(_))));
    }
}
