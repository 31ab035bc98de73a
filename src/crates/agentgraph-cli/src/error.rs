//! Error types for the agentgraph CLI

use agentgraph_checkpoint::CheckpointError;
use agentgraph_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable {key}: {message}")]
    Env { key: String, message: String },

    #[error("Thread '{0}' has no checkpoints")]
    UnknownThread(String),

    #[error("Checkpoint '{checkpoint_id}' not found in thread '{thread_id}'")]
    UnknownCheckpoint { thread_id: String, checkpoint_id: String },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
