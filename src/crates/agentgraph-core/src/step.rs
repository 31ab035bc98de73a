//! The agent step function
//!
//! An [`AgentStep`] turns the current transcript into exactly one new ai
//! message. Strategies differ in how they present tools to the model; the
//! executor treats them all the same. A [`StepFactory`] picks the strategy
//! for each run from its [`RunConfig`].

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

use crate::config::RunConfig;
use crate::error::Result;
use crate::llm::{ChatModel, ChatRequest, MessageAccumulator};
use crate::messages::{AiMessage, Transcript};
use crate::state::AgentState;
use crate::stream::{Event, EventEmitter};
use crate::tool::ToolSet;

/// Per-call context of a step
#[derive(Debug, Clone)]
pub struct StepContext {
    pub config: Arc<RunConfig>,
    pub run_id: String,
    /// Present when the run is streamed
    pub emitter: Option<EventEmitter>,
}

impl StepContext {
    pub fn new(config: Arc<RunConfig>, run_id: impl Into<String>) -> Self {
        Self {
            config,
            run_id: run_id.into(),
            emitter: None,
        }
    }

    pub fn with_emitter(mut self, emitter: Option<EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.config.thread_id
    }
}

/// Produces the next ai message of a run
#[async_trait]
pub trait AgentStep: Send + Sync {
    /// Strategy name used in logs
    fn name(&self) -> &str;

    /// `state` carries the auxiliary channels (few-shot examples); the
    /// transcript is passed separately and is always the latest one.
    async fn step(&self, transcript: &Transcript, state: &AgentState, ctx: &StepContext) -> Result<AiMessage>;
}

/// Selects the step strategy of a run
pub trait StepFactory: Send + Sync {
    fn build(&self, config: &RunConfig, model: Arc<dyn ChatModel>, tools: &ToolSet) -> Result<Arc<dyn AgentStep>>;
}

/// Call the model once.
///
/// Streamed runs consume [`ChatModel::stream`], forwarding every chunk as a
/// `message_delta` event and folding the chunks into the returned message.
/// Otherwise the model is invoked directly.
pub async fn call_model(model: &dyn ChatModel, request: ChatRequest, ctx: &StepContext) -> Result<AiMessage> {
    let emitter = match &ctx.emitter {
        Some(emitter) if model.capabilities().streaming => emitter,
        _ => return Ok(model.invoke(request).await?),
    };

    let mut chunks = model.stream(request).await?;
    let mut accumulator = MessageAccumulator::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if !chunk.is_empty() {
            emitter.emit(Event::message_delta(&ctx.run_id, &chunk)).await;
        }
        accumulator.add_chunk(&chunk);
    }

    debug!(
        model = model.name(),
        run_id = %ctx.run_id,
        chunks = accumulator.chunk_count(),
        "Model stream finished"
    );
    Ok(accumulator.into_message())
}
