//! The tool registry itself: a static table of `Tool` descriptors plus
//! async handlers, built once at startup and invoked by name.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::{GovernanceError, Result};

use super::envelope::{Envelope, ResponseMode};

pub type ToolOutcome = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
pub type ToolHandler = Arc<dyn Fn(Value, ToolContext) -> ToolOutcome + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// Gates lock acquisition in the handler; informational at the
    /// registry level (the handler itself owns the lock manager call).
    pub mutates: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_key: String,
    pub response_mode: ResponseMode,
}

pub struct Dispatcher {
    tools: HashMap<String, Tool>,
    handlers: HashMap<String, ToolHandler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Tool, handler: ToolHandler) -> Result<()> {
        if self.tools.contains_key(&tool.name) {
            return Err(GovernanceError::Internal(format!("tool '{}' already registered", tool.name)));
        }
        let name = tool.name.clone();
        self.tools.insert(name.clone(), tool);
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn list_tools(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Step 2: if `arguments` arrived as a serialized JSON string
    /// (rather than an object), parse it once. Idempotent: an
    /// already-parsed object passes through unchanged.
    fn normalize_arguments(arguments: Value) -> Value {
        match arguments {
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            other => other,
        }
    }

    /// Run one tool invocation end to end: normalize arguments, look
    /// up the handler, enforce its timeout, and shape the result into
    /// a response `{ success, data?, error? }` envelope. Identity
    /// resolution and lock acquisition happen inside the handler
    /// itself, since they depend on tool-specific argument shape.
    #[instrument(skip(self, arguments), fields(tool = tool_name))]
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: Value,
        session_key: &str,
        response_mode: ResponseMode,
    ) -> Envelope {
        let tool = match self.tools.get(tool_name) {
            Some(tool) => tool,
            None => {
                return Envelope::error(&GovernanceError::NotFound(format!("tool '{tool_name}'")));
            }
        };
        let handler = self
            .handlers
            .get(tool_name)
            .expect("handler map and tool map are kept in sync by register()");

        let arguments = Self::normalize_arguments(arguments);
        let ctx = ToolContext {
            session_key: session_key.to_string(),
            response_mode,
        };

        match tokio::time::timeout(tool.timeout, handler(arguments, ctx)).await {
            Ok(Ok(value)) => Envelope::ok(value),
            Ok(Err(e)) => Envelope::error(&e),
            Err(_) => {
                warn!(tool = tool_name, timeout = ?tool.timeout, "tool invocation timed out");
                Envelope::error(&GovernanceError::Timeout(tool.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &str, mutates: bool, timeout: Duration) -> Tool {
        Tool {
            name: name.to_string(),
            description: "echoes its arguments back".to_string(),
            input_schema: json!({"type": "object"}),
            mutates,
            timeout,
        }
    }

    #[tokio::test]
    async fn dispatch_routes_to_registered_handler() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register(
                echo_tool("echo", false, Duration::from_secs(1)),
                Arc::new(|args, _ctx| Box::pin(async move { Ok(args) })),
            )
            .unwrap();

        let envelope = dispatcher
            .dispatch("echo", json!({"x": 1}), "session-a", ResponseMode::Full)
            .await;
        assert!(envelope.success);
        assert_eq!(envelope.data.unwrap(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_is_not_found() {
        let dispatcher = Dispatcher::new();
        let envelope = dispatcher
            .dispatch("nope", json!({}), "session-a", ResponseMode::Auto)
            .await;
        assert!(!envelope.success);
    }

    #[tokio::test]
    async fn dispatch_normalizes_serialized_string_arguments() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register(
                echo_tool("echo", false, Duration::from_secs(1)),
                Arc::new(|args, _ctx| Box::pin(async move { Ok(args) })),
            )
            .unwrap();

        let envelope = dispatcher
            .dispatch("echo", Value::String(r#"{"x":1}"#.to_string()), "session-a", ResponseMode::Full)
            .await;
        assert_eq!(envelope.data.unwrap(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn dispatch_enforces_per_tool_timeout() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register(
                echo_tool("slow", false, Duration::from_millis(10)),
                Arc::new(|_args, _ctx| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(Value::Null)
                    })
                }),
            )
            .unwrap();

        let envelope = dispatcher
            .dispatch("slow", json!({}), "session-a", ResponseMode::Auto)
            .await;
        assert!(!envelope.success);
        assert_eq!(envelope.error.unwrap().code, crate::error::ErrorCode::Timeout);
    }
}
