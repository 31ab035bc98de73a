//! Core trait for chat model integration.
//!
//! # Example Implementation
//!
//! ```rust,ignore
//! use agentgraph_core::llm::{ChatModel, ChatRequest, ModelError};
//! use agentgraph_core::messages::AiMessage;
//! use async_trait::async_trait;
//!
//! struct MyClient {
//!     endpoint: String,
//! }
//!
//! #[async_trait]
//! impl ChatModel for MyClient {
//!     fn name(&self) -> &str {
//!         "my-model"
//!     }
//!
//!     async fn invoke(&self, request: ChatRequest) -> Result<AiMessage, ModelError> {
//!         // call the provider, map the response into an AiMessage
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;
use futures::stream;
use thiserror::Error;

use crate::llm::config::ChatRequest;
use crate::llm_stream::{MessageChunk, MessageChunkStream, ToolCallChunk};
use crate::messages::AiMessage;

/// Errors raised by chat models and the model registry
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    #[error("Model '{0}' is not registered")]
    NotRegistered(String),

    #[error("Failed to initialize model '{model}': {error}")]
    Initialization { model: String, error: String },

    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Model stream failed: {0}")]
    Stream(String),
}

/// What a model family supports natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Accepts `tool_result` messages in the prompt
    pub tool_messages: bool,
    /// Accepts bound tool schemas and returns structured tool calls
    pub tool_binding: bool,
    /// Implements incremental streaming
    pub streaming: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            tool_messages: true,
            tool_binding: true,
            streaming: true,
        }
    }
}

/// A chat model collaborator
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &str;

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::default()
    }

    /// Complete a request in one call
    async fn invoke(&self, request: ChatRequest) -> Result<AiMessage, ModelError>;

    /// Complete a request incrementally.
    ///
    /// The default yields the whole [`invoke`](ChatModel::invoke) result as a
    /// single final chunk.
    async fn stream(&self, request: ChatRequest) -> Result<MessageChunkStream, ModelError> {
        let message = self.invoke(request).await?;
        let tool_call_chunks = message
            .tool_calls
            .iter()
            .enumerate()
            .map(|(index, call)| ToolCallChunk {
                index,
                id: Some(call.id.clone()),
                name: Some(call.name.clone()),
                args: call.args.to_string(),
            })
            .collect();

        let chunk = MessageChunk::new(message.content)
            .with_message_id(message.id)
            .with_tool_call_chunks(tool_call_chunks)
            .final_chunk();

        Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
    }

    async fn is_available(&self) -> Result<bool, ModelError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_stream::MessageAccumulator;
    use crate::messages::{Message, ToolCall};
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::Arc;

    struct FixedModel;

    #[async_trait]
    impl ChatModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn invoke(&self, _request: ChatRequest) -> Result<AiMessage, ModelError> {
            Ok(AiMessage::new("")
                .with_id("m1")
                .with_tool_calls(vec![ToolCall::new("c1", "search", json!({"q": "weather"}))]))
        }
    }

    #[tokio::test]
    async fn test_trait_object() {
        let model: Arc<dyn ChatModel> = Arc::new(FixedModel);
        let message = model
            .invoke(ChatRequest::new(vec![Message::human("hi")]))
            .await
            .unwrap();
        assert_eq!(message.tool_calls.len(), 1);
        assert!(model.is_available().await.unwrap());
        assert_eq!(model.capabilities(), ModelCapabilities::default());
    }

    #[tokio::test]
    async fn test_default_stream_reassembles() {
        let model = FixedModel;
        let mut stream = model.stream(ChatRequest::default()).await.unwrap();

        let mut accumulator = MessageAccumulator::new();
        while let Some(chunk) = stream.next().await {
            accumulator.add_chunk(&chunk.unwrap());
        }
        let message = accumulator.into_message();

        assert_eq!(message.id, "m1");
        assert_eq!(message.tool_calls, vec![ToolCall::new("c1", "search", json!({"q": "weather"}))]);
    }
}
