//! Error types for agent runs
//!
//! # Error Hierarchy
//!
//! ```text
//! AgentError
//! ├── ThreadNotFound    - resume requested for a thread that never ran   (caller)
//! ├── InvalidInput      - input messages that cannot be coerced          (caller)
//! ├── InvalidConfig     - bad limits, unknown tool or model id
//! ├── Model             - chat model unreachable / failed
//! ├── Checkpoint        - checkpoint store failure
//! ├── Examples          - few-shot example source failure
//! ├── InvalidState      - persisted state the executor cannot continue from
//! ├── Serialization     - JSON errors
//! └── Execution         - run task panicked or was torn down
//! ```
//!
//! Tool failures never appear here: the tool invoker converts them into
//! error `tool_result` messages so the model can recover conversationally.
//!
//! Request validation (thread id, limits, input coercion, resume of an unknown
//! thread) happens before a run starts and is returned directly from
//! `Runner::stream_run` / `Runner::create_run`. Anything raised after that
//! ends the run and is surfaced as a `run_error` event.

use agentgraph_checkpoint::CheckpointError;
use thiserror::Error;

use crate::llm::ModelError;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Thread '{0}' not found")]
    ThreadNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Example source error: {0}")]
    Examples(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Execution failed: {0}")]
    Execution(String),
}

impl AgentError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Short machine-readable category, used in `run_error` payloads
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ThreadNotFound(_) => "thread_not_found",
            AgentError::InvalidInput(_) => "invalid_input",
            AgentError::InvalidConfig(_) => "invalid_config",
            AgentError::Model(_) => "model",
            AgentError::Checkpoint(_) => "checkpoint",
            AgentError::Examples(_) => "examples",
            AgentError::InvalidState(_) => "invalid_state",
            AgentError::Serialization(_) => "serialization",
            AgentError::Execution(_) => "execution",
        }
    }
}
