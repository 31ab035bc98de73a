//! Tools and the concurrent tool invoker
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  ToolRegistry   (every tool the host knows)    │
//! └──────────────────────┬────────────────────────┘
//!                        │ select(RunConfig.tools)
//!                        ↓
//! ┌───────────────────────────────────────────────┐
//! │  ToolSet        (tools bound to one run)       │
//! └──────────────────────┬────────────────────────┘
//!                        │
//!   ai.tool_calls ──→ ToolInvoker::invoke_many
//!                        │
//!        ┌───────────────┼───────────────┐
//!        ↓               ↓               ↓
//!    task(call 1)    task(call 2)    task(call 3)      one tokio task per call
//!        │               │               │
//!        └───────────────┴───────────────┘
//!                        │ joined, input order kept
//!                        ↓
//!            [ToolResultMessage; n]
//! ```
//!
//! Failures stay inside the batch. An unknown tool, bad arguments, a tool
//! error or a panicking tool each produce an error `tool_result` for that
//! call only; its siblings are unaffected and the run goes on so the model
//! can react to the error.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::llm::ToolDefinition;
use crate::messages::{InvalidToolCall, ToolCall, ToolResultMessage};

/// Tool execution result
pub type ToolResult = std::result::Result<Value, ToolError>;

#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolError {
    /// Tool not found in the run's tool set
    #[error("Tool '{0}' not found. Available tools: {1}")]
    NotFound(String, String),

    #[error("Invalid arguments for tool '{tool}': {error}")]
    InvalidArguments { tool: String, error: String },

    #[error("Tool '{tool}' execution failed: {error}")]
    ExecutionFailed { tool: String, error: String },

    /// Model output that could not be parsed into a call
    #[error("Malformed tool call: {0}")]
    Malformed(String),
}

impl ToolError {
    pub fn failed(tool: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::ExecutionFailed {
            tool: tool.into(),
            error: error.to_string(),
        }
    }
}

/// Context handed to every tool invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolContext {
    pub thread_id: String,
    pub assistant_id: Option<String>,
    /// Tool-configuration key, e.g. a retrieval namespace
    pub scope: Option<String>,
    pub run_id: Option<String>,
    /// Id of the call being answered; set per call by the invoker
    pub call_id: Option<String>,
}

impl ToolContext {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            ..Default::default()
        }
    }

    pub fn with_assistant_id(mut self, assistant_id: Option<String>) -> Self {
        self.assistant_id = assistant_id;
        self
    }

    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    fn for_call(&self, call_id: &str) -> Self {
        let mut ctx = self.clone();
        ctx.call_id = Some(call_id.to_string());
        ctx
    }
}

/// A named capability the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the argument object
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn invoke(&self, args: Value, ctx: ToolContext) -> ToolResult;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(self.input_schema())
    }
}

type ToolFn = Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, ToolResult> + Send + Sync>;

/// Tool backed by an async closure
///
/// ```rust
/// use agentgraph_core::tool::{FnTool, Tool};
/// use serde_json::json;
///
/// let tool = FnTool::new("echo", "Echo the input", |args, _ctx| async move { Ok(args) });
/// assert_eq!(tool.name(), "echo");
/// ```
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    func: ToolFn,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: json!({"type": "object"}),
            func: Arc::new(move |args, ctx| Box::pin(func(args, ctx))),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn invoke(&self, args: Value, ctx: ToolContext) -> ToolResult {
        (self.func)(args, ctx).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool").field("name", &self.name).finish()
    }
}

/// Every tool the host can offer to a run
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Bind the configured tool names for one run.
    ///
    /// A name without a registered implementation is a configuration error.
    pub fn select(&self, names: &[String]) -> Result<ToolSet> {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let tool = self.tools.get(name).ok_or_else(|| {
                AgentError::invalid_config(format!(
                    "tool '{}' is not registered. Registered tools: {}",
                    name,
                    render_names(&self.names())
                ))
            })?;
            if !selected.iter().any(|t: &Arc<dyn Tool>| t.name() == name) {
                selected.push(tool.clone());
            }
        }
        Ok(ToolSet {
            tools: Arc::new(selected),
        })
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

/// Tools bound to a single run, in configuration order
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Arc<Vec<Arc<dyn Tool>>>,
}

impl ToolSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet").field("tools", &self.names()).finish()
    }
}

fn render_names(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

/// Dispatches one batch of tool calls
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolInvoker;

impl ToolInvoker {
    pub fn new() -> Self {
        Self
    }

    /// Run every call concurrently and answer each with exactly one result.
    ///
    /// Returns once all calls completed, results in the order of `calls`.
    pub async fn invoke_many(
        &self,
        calls: &[ToolCall],
        tools: &ToolSet,
        ctx: &ToolContext,
    ) -> Vec<ToolResultMessage> {
        let tasks = calls.iter().map(|call| {
            let tool = tools.get(&call.name);
            let available = render_names(&tools.names());
            let call = call.clone();
            let call_ctx = ctx.for_call(&call.id);

            async move {
                let Some(tool) = tool else {
                    let err = ToolError::NotFound(call.name.clone(), available);
                    warn!(tool = %call.name, call_id = %call.id, "Model requested unknown tool");
                    return ToolResultMessage::error(call.id, Some(call.name), err);
                };

                let args = match normalize_args(&call) {
                    Ok(args) => args,
                    Err(err) => {
                        warn!(tool = %call.name, call_id = %call.id, error = %err, "Rejected tool arguments");
                        return ToolResultMessage::error(call.id, Some(call.name), err);
                    }
                };

                debug!(tool = %call.name, call_id = %call.id, "Invoking tool");
                let handle = tokio::spawn(async move { tool.invoke(args, call_ctx).await });

                match handle.await {
                    Ok(Ok(output)) => ToolResultMessage::success(call.id, call.name, output),
                    Ok(Err(err)) => {
                        warn!(tool = %call.name, call_id = %call.id, error = %err, "Tool failed");
                        ToolResultMessage::error(call.id, Some(call.name), err)
                    }
                    Err(join_err) => {
                        let err = if join_err.is_panic() {
                            ToolError::failed(&call.name, "tool panicked")
                        } else {
                            ToolError::failed(&call.name, "tool task was cancelled")
                        };
                        warn!(tool = %call.name, call_id = %call.id, error = %err, "Tool task aborted");
                        ToolResultMessage::error(call.id, Some(call.name), err)
                    }
                }
            }
        });

        join_all(tasks).await
    }

    /// Answer calls the model produced but that could not be parsed.
    pub fn reject_invalid(&self, invalid: &[InvalidToolCall]) -> Vec<ToolResultMessage> {
        invalid
            .iter()
            .map(|call| {
                let detail = match &call.raw_args {
                    Some(raw) => format!("{} (raw arguments: {})", call.error, raw),
                    None => call.error.clone(),
                };
                warn!(call_id = %call.id, error = %call.error, "Answering malformed tool call");
                ToolResultMessage::error(&call.id, call.name.clone(), ToolError::Malformed(detail))
            })
            .collect()
    }
}

/// `null` means "no arguments"; anything else must be an object.
fn normalize_args(call: &ToolCall) -> ToolResult {
    match &call.args {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(call.args.clone()),
        other => Err(ToolError::InvalidArguments {
            tool: call.name.clone(),
            error: format!("expected a JSON object, got {}", other),
        }),
    }
}
