//! Incremental model output
//!
//! Streaming models yield [`MessageChunk`]s. Text arrives as content deltas;
//! tool calls arrive as [`ToolCallChunk`]s keyed by call index, where the
//! first fragment of a call usually carries its id and name and later
//! fragments only append to the JSON argument string.
//!
//! [`MessageAccumulator`] folds a chunk sequence back into one [`AiMessage`].
//! Argument strings that do not parse as JSON once the stream ends become
//! invalid tool calls rather than errors.

use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::pin::Pin;
use uuid::Uuid;

use crate::llm::ModelError;
use crate::messages::{AiMessage, InvalidToolCall, ToolCall};

pub type MessageChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, ModelError>> + Send>>;

/// Fragment of a streamed tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    /// Position of the call within the message
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fragment of the JSON argument string
    #[serde(default)]
    pub args: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageChunk {
    pub content: String,

    pub tool_call_chunks: Vec<ToolCallChunk>,

    pub message_id: Option<String>,

    pub is_final: bool,
}

impl MessageChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_tool_call_chunks(mut self, chunks: Vec<ToolCallChunk>) -> Self {
        self.tool_call_chunks = chunks;
        self
    }

    pub fn final_chunk(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.tool_call_chunks.is_empty()
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    args: String,
}

/// Folds streamed chunks into the final message
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    message_id: Option<String>,
    content: String,
    calls: BTreeMap<usize, PartialCall>,
    chunk_count: usize,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunk(&mut self, chunk: &MessageChunk) {
        if self.message_id.is_none() {
            self.message_id = chunk.message_id.clone();
        }
        self.content.push_str(&chunk.content);
        for fragment in &chunk.tool_call_chunks {
            let call = self.calls.entry(fragment.index).or_default();
            if call.id.is_none() {
                call.id = fragment.id.clone();
            }
            if call.name.is_none() {
                call.name = fragment.name.clone();
            }
            call.args.push_str(&fragment.args);
        }
        self.chunk_count += 1;
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn into_message(self) -> AiMessage {
        let mut tool_calls = Vec::new();
        let mut invalid_tool_calls = Vec::new();

        for (_, call) in self.calls {
            let id = call.id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let raw = call.args.trim();
            let parsed = if raw.is_empty() {
                Ok(Value::Object(Default::default()))
            } else {
                serde_json::from_str::<Value>(raw)
            };

            match (call.name, parsed) {
                (Some(name), Ok(args)) => tool_calls.push(ToolCall::new(id, name, args)),
                (name, Err(e)) => invalid_tool_calls.push(InvalidToolCall {
                    id,
                    name,
                    raw_args: Some(call.args.clone()),
                    error: format!("arguments are not valid JSON: {}", e),
                }),
                (None, Ok(_)) => invalid_tool_calls.push(InvalidToolCall {
                    id,
                    name: None,
                    raw_args: Some(call.args.clone()),
                    error: "tool call has no name".to_string(),
                }),
            }
        }

        let message = AiMessage::new(self.content)
            .with_tool_calls(tool_calls)
            .with_invalid_tool_calls(invalid_tool_calls);
        match self.message_id {
            Some(id) => message.with_id(id),
            None => message,
        }
    }
}
