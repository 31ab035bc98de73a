//! Error types for the prebuilt step strategies
//!
//! Parse failures of model output never surface as errors of a run: the XML
//! strategy turns them into invalid tool calls. What remains here are
//! strategy/model mismatches detected when a run is prepared.

use agentgraph_core::AgentError;
use thiserror::Error;

/// Result type for prebuilt operations
pub type Result<T> = std::result::Result<T, PrebuiltError>;

#[derive(Error, Debug)]
pub enum PrebuiltError {
    /// Model output with a `<tool>` block that could not be read
    #[error("Failed to parse tool invocation: {0}")]
    XmlParse(String),

    /// Strategy needs a capability the configured model lacks
    #[error("Model '{model}' does not support {capability}")]
    Unsupported { model: String, capability: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl From<PrebuiltError> for AgentError {
    fn from(err: PrebuiltError) -> Self {
        match err {
            PrebuiltError::Agent(inner) => inner,
            PrebuiltError::Serialization(e) => AgentError::Serialization(e),
            other => AgentError::InvalidConfig(other.to_string()),
        }
    }
}
