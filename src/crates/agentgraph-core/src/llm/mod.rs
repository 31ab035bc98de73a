//! Chat model collaborator traits and types.
//!
//! agentgraph does not ship provider clients. Applications implement
//! [`ChatModel`] for their provider and register it with a [`ModelRegistry`]
//! under a model id; runs refer to models only by that id.
//!
//! # Lifecycle
//!
//! ```text
//!  register(id, factory)        first get(id)             shutdown()
//!  ─────────────────────►  factory() runs exactly once  ─────────────►  cache dropped
//!                          (concurrent callers wait)
//! ```
//!
//! A run resolves its model once, at start, and keeps the `Arc<dyn ChatModel>`
//! until it finishes, so a model is never rebuilt in the middle of a run.

pub mod config;
pub mod registry;
pub mod tools;
pub mod traits;

pub use config::ChatRequest;
pub use registry::{ModelFactory, ModelRegistry};
pub use tools::ToolDefinition;
pub use traits::{ChatModel, ModelCapabilities, ModelError};

// Re-export streaming types from parent module
pub use crate::llm_stream::{MessageAccumulator, MessageChunk, MessageChunkStream, ToolCallChunk};
