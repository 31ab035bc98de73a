//! Chat request construction

use crate::llm::tools::ToolDefinition;
use crate::messages::Message;

/// One call to a chat model
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System message first, then the transcript
    pub messages: Vec<Message>,

    /// Tools bound for native tool calling. Empty when the model should not call tools.
    pub tools: Vec<ToolDefinition>,

    pub stop_sequences: Vec<String>,

    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = sequences;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_builder() {
        let request = ChatRequest::new(vec![Message::human("test")])
            .with_tools(vec![ToolDefinition::new("search", "")])
            .with_stop_sequences(vec!["</tool_input>".to_string()])
            .with_temperature(0.2);

        assert_eq!(request.messages.len(), 1);
        assert!(request.has_tools());
        assert_eq!(request.stop_sequences, vec!["</tool_input>".to_string()]);
        assert_eq!(request.temperature, Some(0.2));
    }
}
