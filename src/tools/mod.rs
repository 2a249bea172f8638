//! Tool Registry and Dispatcher
//!
//! Tools declare a typed parameter schema up front; the dispatcher binds and
//! validates arguments against it, executes the handler, and always hands
//! the reasoning loop a well-formed `ToolResult` envelope, never an
//! unchecked fault.

pub mod builtin;

use async_trait::async_trait;
use futures::FutureExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::GatewaySettings;
use crate::error::{FailureKind, ToolError};
use crate::types::{Citation, Renderable, ToolCall, ToolResult};

/// Declared type of one tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    StringList,
}

impl ParamType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Float => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    /// JSON-schema type name used when presenting the catalogue.
    pub fn schema_name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Float => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::StringList => "array",
        }
    }
}

/// One named, typed, optionally-required tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            description: description.into(),
        }
    }
}

/// Introspectable description of a tool: unique name, description, and the
/// ordered parameter schema presented to the reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// JSON-schema object for the parameter list.
    pub fn schema_json(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.param_type.schema_name(),
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Arguments that passed schema validation, with typed accessors.
#[derive(Debug, Clone)]
pub struct BoundArgs(Map<String, Value>);

impl BoundArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn get_object(&self, name: &str) -> Option<&Map<String, Value>> {
        self.0.get(name).and_then(Value::as_object)
    }

    /// Required-string accessor; tools use this to fail fast before any
    /// graph I/O if a validated argument is somehow absent.
    pub fn require_str(&self, name: &str) -> Result<&str, ToolError> {
        self.get_str(name)
            .ok_or_else(|| ToolError::InvalidArguments(vec![format!("missing argument '{name}'")]))
    }
}

/// Successful tool output: typed payload, the citations backing it, and an
/// optional renderable artifact for the UI.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub payload: Value,
    pub citations: Vec<Citation>,
    pub renderable: Option<Renderable>,
}

impl ToolOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            citations: Vec::new(),
            renderable: None,
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn with_renderable(mut self, renderable: Renderable) -> Self {
        self.renderable = Some(renderable);
        self
    }
}

/// An executable analytical routine.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn execute(&self, args: &BoundArgs) -> Result<ToolOutput, ToolError>;
}

/// Append-only mapping from tool name to handler. Registered once at
/// startup; enumerable for presentation to the reasoning service.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.spec().name;
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        debug!(tool = %name, "registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Catalogue in deterministic name order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

/// Executes tool calls against the registry, normalizing every outcome into
/// a `ToolResult`. Owns the retry policy for transient store faults.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, gateway_settings: &GatewaySettings) -> Self {
        Self {
            registry,
            retry_attempts: gateway_settings.retry_attempts,
            retry_base_delay: gateway_settings.retry_base_delay(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Dispatch one call. Unknown tools, invalid arguments, handler errors,
    /// and handler panics all come back as typed `Failure` outcomes.
    pub async fn dispatch(&self, call: ToolCall) -> ToolResult {
        let started = Instant::now();

        let Some(tool) = self.registry.get(&call.name) else {
            return ToolResult::failure(
                call.clone(),
                FailureKind::ToolNotFound,
                format!("no tool registered under the name '{}'", call.name),
                started.elapsed(),
            );
        };

        let spec = tool.spec();
        let args = match bind_arguments(&spec, &call.arguments) {
            Ok(args) => args,
            Err(violations) => {
                return ToolResult::failure(
                    call.clone(),
                    FailureKind::InvalidArguments,
                    violations.join("; "),
                    started.elapsed(),
                );
            }
        };

        let mut attempt = 0u32;
        let error = loop {
            match self.run_handler(tool.as_ref(), &args).await {
                Ok(output) => {
                    debug!(tool = %call.name, elapsed = ?started.elapsed(), "tool call succeeded");
                    return ToolResult::success(
                        call,
                        output.payload,
                        output.citations,
                        output.renderable,
                        started.elapsed(),
                    );
                }
                Err(error) if error.is_retryable() && attempt < self.retry_attempts => {
                    attempt += 1;
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        tool = %call.name,
                        attempt,
                        ?delay,
                        %error,
                        "transient store fault, retrying tool call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => break error,
            }
        };

        warn!(tool = %call.name, %error, "tool call failed");
        ToolResult::failure(
            call,
            FailureKind::from(&error),
            error.to_string(),
            started.elapsed(),
        )
    }

    async fn run_handler(&self, tool: &dyn Tool, args: &BoundArgs) -> Result<ToolOutput, ToolError> {
        match AssertUnwindSafe(tool.execute(args)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool handler panicked".to_string());
                Err(ToolError::Execution(message))
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
        let jitter_cap = (base.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        base + Duration::from_millis(jitter)
    }
}

/// Type-check and bind arguments against the declared schema, collecting
/// every violation instead of failing on the first.
fn bind_arguments(spec: &ToolSpec, arguments: &Value) -> Result<BoundArgs, Vec<String>> {
    let supplied: Map<String, Value> = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(vec![format!(
                "arguments must be a JSON object, got {other}"
            )]);
        }
    };

    let mut violations = Vec::new();

    for param in &spec.params {
        match supplied.get(&param.name) {
            None | Some(Value::Null) if param.required => {
                violations.push(format!("missing required argument '{}'", param.name));
            }
            Some(value) if !value.is_null() && !param.param_type.matches(value) => {
                violations.push(format!(
                    "argument '{}' must be of type {}, got {value}",
                    param.name,
                    param.param_type.schema_name(),
                ));
            }
            _ => {}
        }
    }

    for name in supplied.keys() {
        if !spec.params.iter().any(|p| &p.name == name) {
            violations.push(format!("unknown argument '{name}'"));
        }
    }

    if violations.is_empty() {
        Ok(BoundArgs(supplied))
    } else {
        Err(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec::new("echo", "Echo a message back").with_param(ParamSpec::required(
                "message",
                ParamType::String,
                "Message to echo",
            ))
        }

        async fn execute(&self, args: &BoundArgs) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::new(json!({ "echo": args.require_str("message")? })))
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        Dispatcher::new(Arc::new(registry), &GatewaySettings::default())
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, ToolError::Duplicate(name) if name == "echo"));
    }

    #[test]
    fn validation_collects_all_violations() {
        let spec = EchoTool.spec();
        let violations = bind_arguments(
            &spec,
            &json!({ "message": 7, "verbose": true }),
        )
        .unwrap_err();
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("message"));
        assert!(violations[1].contains("unknown argument 'verbose'"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_result() {
        let result = dispatcher()
            .dispatch(ToolCall::new("no_such_tool", json!({})))
            .await;
        assert!(matches!(
            result.outcome,
            crate::types::ToolOutcome::Failure {
                kind: FailureKind::ToolNotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn well_formed_call_succeeds() {
        let result = dispatcher()
            .dispatch(ToolCall::new("echo", json!({ "message": "hi" })))
            .await;
        assert!(result.is_success());
    }
}
