//! # agentgraph-core - Checkpointed LLM Agent Execution
//!
//! A step-based control loop that interleaves chat-model calls with tool
//! invocations, persists every transition as a checkpoint and exposes the
//! run as a stream of named events.
//!
//! ## Overview
//!
//! ```text
//!  Runner::stream_run(thread, input, config)
//!        │
//!        │ validate (thread id, limits, input, resume target)
//!        ↓
//!  ┌──────────────────────────── GraphExecutor ──────────────────────────┐
//!  │                                                                     │
//!  │   load latest checkpoint ─► merge input ─► input checkpoint         │
//!  │                                               │                     │
//!  │        ┌──────────────────────────────────────┘                     │
//!  │        ↓                                                            │
//!  │     agent  ──(AgentStep: prompt + ChatModel)──► ai message          │
//!  │        │                                           │                │
//!  │        │ pending calls? ── yes ──► action ──(ToolInvoker)──┐        │
//!  │        │                                                   │        │
//!  │        no                          back to agent ◄─────────┘        │
//!  │        ↓                                                            │
//!  │       end          (a loop checkpoint after every node)             │
//!  └─────────────────────────────────────────────────────────────────────┘
//!        │
//!        ↓ message_delta / step_complete / run_complete / run_error
//!    EventStream
//! ```
//!
//! ## Modules
//!
//! - [`messages`] - message variants, transcript and the `add_messages` reducer
//! - [`llm`] - chat model trait, requests, streaming chunks, model registry
//! - [`tool`] - tool trait, registry, per-run tool set, concurrent invoker
//! - [`config`] - per-run configuration
//! - [`examples`] - few-shot example sources and selection policy
//! - [`state`] - typed checkpoint channels and thread state operations
//! - [`step`] - the agent step function and its factory
//! - [`executor`] - the agent/action/end state machine
//! - [`stream`] - run events and the streaming adapter
//! - [`runner`] - `create_run` / `stream_run` entry points
//! - `testing` - scripted models and tools (`testing` feature)
//!
//! ## Quick Start
//!
//! ```rust
//! use agentgraph_checkpoint::InMemoryCheckpointSaver;
//! use agentgraph_core::testing::{PassthroughStepFactory, ScriptedModel};
//! use agentgraph_core::{AiMessage, GraphExecutor, ModelRegistry, RunConfig, RunStatus};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> agentgraph_core::Result<()> {
//! let models = Arc::new(ModelRegistry::new());
//! models.register_instance("demo", Arc::new(ScriptedModel::new(vec![AiMessage::new("4")])));
//!
//! let executor = GraphExecutor::new(
//!     Arc::new(InMemoryCheckpointSaver::new()),
//!     Arc::new(PassthroughStepFactory),
//! )
//! .with_models(models);
//!
//! let outcome = executor
//!     .invoke(RunConfig::new("thread-1", "demo"), Some("2+2?".into()))
//!     .await?;
//! assert_eq!(outcome.status, RunStatus::Completed);
//! assert_eq!(outcome.messages.last().unwrap().text(), "4");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod examples;
pub mod executor;
pub mod llm;
pub mod llm_stream;
pub mod messages;
pub mod runner;
pub mod state;
pub mod step;
pub mod stream;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tool;

pub use config::{AgentType, RunConfig, Verbosity, DEFAULT_MAX_STEPS, DEFAULT_SYSTEM_MESSAGE};
pub use error::{AgentError, Result};
pub use examples::{Example, ExamplePolicy, ExampleSource, InMemoryExampleSource, SelectionStrategy};
pub use executor::{
    route_after, GraphExecutor, Node, RunOutcome, RunRequest, RunStatus, STOP_MESSAGE, STOP_REASON_MAX_STEPS,
    STOP_REASON_MAX_TIME,
};
pub use llm::{
    ChatModel, ChatRequest, MessageAccumulator, MessageChunk, MessageChunkStream, ModelCapabilities, ModelError,
    ModelRegistry, ToolCallChunk, ToolDefinition,
};
pub use messages::{
    add_messages, AiMessage, HumanMessage, InvalidToolCall, Message, MessageInput, MessageKind, MessageLike,
    SystemMessage, ToolCall, ToolResultMessage, Transcript,
};
pub use runner::{Run, RunProgress, Runner};
pub use state::{AgentState, StateSnapshot, ThreadStore, EXAMPLES_CHANNEL, MESSAGES_CHANNEL};
pub use step::{call_model, AgentStep, StepContext, StepFactory};
pub use stream::{Event, EventEmitter, EventKind, EventStream};
pub use tool::{FnTool, Tool, ToolContext, ToolError, ToolInvoker, ToolRegistry, ToolResult, ToolSet};
