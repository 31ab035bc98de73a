//! Scripted collaborators for tests and demos
//!
//! [`ScriptedModel`] replays a fixed list of ai messages and records every
//! request it receives. [`PassthroughStepFactory`] builds a minimal step
//! that sends `[system] + transcript` with the run's tools bound. The tool
//! constructors cover the usual cases: echo, failure, panic, latency.

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RunConfig;
use crate::error::Result;
use crate::llm::{
    ChatModel, ChatRequest, MessageChunk, MessageChunkStream, ModelCapabilities, ModelError, ToolCallChunk,
};
use crate::messages::{AiMessage, Message, Transcript};
use crate::state::AgentState;
use crate::step::{call_model, AgentStep, StepContext, StepFactory};
use crate::tool::{FnTool, ToolError, ToolSet};

/// Chat model that answers from a script
pub struct ScriptedModel {
    script: Mutex<VecDeque<AiMessage>>,
    requests: Mutex<Vec<ChatRequest>>,
    capabilities: ModelCapabilities,
    latency: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(script: Vec<AiMessage>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            capabilities: ModelCapabilities::default(),
            latency: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sleep before every answer
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
    }

    async fn invoke(&self, request: ChatRequest) -> std::result::Result<AiMessage, ModelError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.requests.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .ok_or_else(|| ModelError::Request("script exhausted".to_string()))
    }

    /// Content is streamed word by word; each tool call's arguments arrive
    /// split over two fragments.
    async fn stream(&self, request: ChatRequest) -> std::result::Result<MessageChunkStream, ModelError> {
        let message = self.invoke(request).await?;
        let mut chunks: Vec<_> = message
            .content
            .split_inclusive(' ')
            .map(|word| MessageChunk::new(word).with_message_id(message.id.clone()))
            .collect();

        let mut fragments = Vec::new();
        for (index, call) in message.tool_calls.iter().enumerate() {
            let args = call.args.to_string();
            let middle = args
                .char_indices()
                .nth(args.chars().count() / 2)
                .map_or(args.len(), |(i, _)| i);
            let (head, tail) = args.split_at(middle);
            fragments.push(ToolCallChunk {
                index,
                id: Some(call.id.clone()),
                name: Some(call.name.clone()),
                args: head.to_string(),
            });
            fragments.push(ToolCallChunk {
                index,
                id: None,
                name: None,
                args: tail.to_string(),
            });
        }
        chunks.push(
            MessageChunk::default()
                .with_message_id(message.id.clone())
                .with_tool_call_chunks(fragments)
                .final_chunk(),
        );

        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}

struct PassthroughStep {
    model: Arc<dyn ChatModel>,
    tools: ToolSet,
}

#[async_trait]
impl AgentStep for PassthroughStep {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn step(&self, transcript: &Transcript, _state: &AgentState, ctx: &StepContext) -> Result<AiMessage> {
        let mut messages = vec![Message::system(ctx.config.system_message.clone())];
        messages.extend(transcript.iter().cloned());
        let request = ChatRequest::new(messages).with_tools(self.tools.definitions());
        call_model(self.model.as_ref(), request, ctx).await
    }
}

/// Builds a step that forwards the transcript unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStepFactory;

impl StepFactory for PassthroughStepFactory {
    fn build(&self, _config: &RunConfig, model: Arc<dyn ChatModel>, tools: &ToolSet) -> Result<Arc<dyn AgentStep>> {
        Ok(Arc::new(PassthroughStep {
            model,
            tools: tools.clone(),
        }))
    }
}

/// `echo`: returns its arguments
pub fn echo_tool() -> FnTool {
    FnTool::new("echo", "Return the arguments unchanged", |args, _| async move { Ok(args) })
}

/// `fail`: always returns an execution error
pub fn failing_tool() -> FnTool {
    FnTool::new("fail", "Always fails", |_, _| async move {
        Err(ToolError::failed("fail", "service unavailable"))
    })
}

/// `explode`: panics inside the tool task
pub fn panicking_tool() -> FnTool {
    FnTool::new("explode", "Panics", |args, _| async move {
        if !args.is_array() {
            panic!("tool exploded");
        }
        Ok(Value::Null)
    })
}

/// Tool named `name` that answers `{"slept_ms": ..}` after `delay`
pub fn sleeping_tool(name: &str, delay: Duration) -> FnTool {
    FnTool::new(name, "Sleeps, then answers", move |_, _| async move {
        tokio::time::sleep(delay).await;
        Ok(json!({"slept_ms": delay.as_millis() as u64}))
    })
}
