//! Prompt-based tool calling
//!
//! The model sees its tools as text and answers with tagged blocks:
//!
//! ```text
//! I should look this up.<tool>search</tool><tool_input>weather in SF
//! ```
//!
//! Generation stops at [`XML_STOP_SEQUENCE`], so the closing `</tool_input>`
//! is usually missing from the output and the parser does not require it.
//! A tool input that is a JSON object is passed as-is; anything else becomes
//! `{"input": text}`.

use agentgraph_core::{
    call_model, AgentState, AgentStep, AiMessage, ChatModel, ChatRequest, InvalidToolCall, Message, StepContext,
    ToolCall, ToolSet, Transcript,
};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::error::PrebuiltError;
use crate::messages::to_xml;
use crate::prompt::SystemPrompt;

/// Stop sequence sent with every XML request
pub const XML_STOP_SEQUENCE: &str = "</tool_input>";

/// Step that describes tools in the prompt and parses tagged output
pub struct XmlToolStep {
    model: Arc<dyn ChatModel>,
    tools: ToolSet,
}

impl XmlToolStep {
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolSet) -> Self {
        Self { model, tools }
    }

    fn request(&self, transcript: &Transcript, state: &AgentState, ctx: &StepContext) -> ChatRequest {
        let system = SystemPrompt::new(&ctx.config.system_message)
            .with_examples(&state.examples)
            .with_xml_tools(&self.tools)
            .render();

        let mut messages = vec![Message::system(system)];
        messages.extend(to_xml(transcript));
        ChatRequest::new(messages).with_stop_sequences(vec![XML_STOP_SEQUENCE.to_string()])
    }
}

#[async_trait]
impl AgentStep for XmlToolStep {
    fn name(&self) -> &str {
        "xml"
    }

    async fn step(
        &self,
        transcript: &Transcript,
        state: &AgentState,
        ctx: &StepContext,
    ) -> agentgraph_core::Result<AiMessage> {
        let request = self.request(transcript, state, ctx);
        let raw = call_model(self.model.as_ref(), request, ctx).await?;
        let parsed = parse_xml_output(raw);

        if !parsed.invalid_tool_calls.is_empty() {
            warn!(
                run_id = %ctx.run_id,
                invalid = parsed.invalid_tool_calls.len(),
                "Model produced unreadable tool blocks"
            );
        }
        debug!(run_id = %ctx.run_id, calls = parsed.tool_calls.len(), "Parsed XML output");
        Ok(parsed)
    }
}

fn tool_block() -> &'static Regex {
    static TOOL_BLOCK: OnceLock<Regex> = OnceLock::new();
    TOOL_BLOCK.get_or_init(|| {
        Regex::new(r"(?s)<tool>(.*?)</tool>\s*(?:<tool_input>(.*?)(?:</tool_input>|$))?")
            .expect("Invalid regex pattern")
    })
}

fn final_answer() -> &'static Regex {
    static FINAL_ANSWER: OnceLock<Regex> = OnceLock::new();
    FINAL_ANSWER.get_or_init(|| {
        Regex::new(r"(?s)<final_answer>(.*?)(?:</final_answer>|$)").expect("Invalid regex pattern")
    })
}

/// Turn the model's tagged text into tool calls.
///
/// Text before the first `<tool>` block stays as content. Blocks with an
/// empty tool name or without `<tool_input>` become invalid tool calls, so
/// the executor answers them with an error result instead of failing the
/// run. Without any tool block, a `<final_answer>` wrapper is stripped.
pub fn parse_xml_output(mut message: AiMessage) -> AiMessage {
    if !tool_block().is_match(&message.content) {
        if let Some(answer) = final_answer().captures(&message.content).map(|caps| caps[1].trim().to_string()) {
            message.content = answer;
        }
        return message;
    }

    let text = std::mem::take(&mut message.content);

    let mut calls = Vec::new();
    let mut invalid = Vec::new();
    let mut first_block_at = text.len();

    for (index, caps) in tool_block().captures_iter(&text).enumerate() {
        if let Some(whole) = caps.get(0) {
            first_block_at = first_block_at.min(whole.start());
        }
        let id = format!("{}_call_{}", message.id, index);
        let name = caps[1].trim().to_string();
        let input = caps.get(2).map(|m| m.as_str().trim().to_string());

        match (name.is_empty(), input) {
            (false, Some(input)) => calls.push(ToolCall::new(id, name, tool_args(&input))),
            (true, input) => invalid.push(InvalidToolCall {
                id,
                name: None,
                raw_args: input,
                error: PrebuiltError::XmlParse("empty tool name".to_string()).to_string(),
            }),
            (false, None) => invalid.push(InvalidToolCall {
                error: PrebuiltError::XmlParse(format!("missing <tool_input> for tool '{}'", name)).to_string(),
                id,
                name: Some(name),
                raw_args: None,
            }),
        }
    }

    message.content = text[..first_block_at].trim_end().to_string();
    message.tool_calls.extend(calls);
    message.invalid_tool_calls.extend(invalid);
    message
}

fn tool_args(input: &str) -> Value {
    match serde_json::from_str::<Value>(input) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "input": input }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> AiMessage {
        parse_xml_output(AiMessage::new(text).with_id("m"))
    }

    #[test]
    fn test_plain_answer() {
        let message = parse("Four.");
        assert_eq!(message.content, "Four.");
        assert!(!message.has_pending_calls());
    }

    #[test]
    fn test_final_answer_is_unwrapped() {
        assert_eq!(parse("<final_answer> 4 </final_answer>").content, "4");
        assert_eq!(parse("Done: <final_answer>4").content, "4");
    }

    #[test]
    fn test_truncated_tool_input() {
        let message = parse("I should search.<tool>search</tool><tool_input>weather in SF");
        assert_eq!(message.content, "I should search.");
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].id, "m_call_0");
        assert_eq!(message.tool_calls[0].name, "search");
        assert_eq!(message.tool_calls[0].args, json!({"input": "weather in SF"}));
    }

    #[test]
    fn test_json_object_input() {
        let message = parse(r#"<tool>calc</tool>
<tool_input>{"a": 1, "b": 2}</tool_input>"#);
        assert_eq!(message.content, "");
        assert_eq!(message.tool_calls[0].args, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_json_scalar_input_is_wrapped() {
        let message = parse("<tool>calc</tool><tool_input>42</tool_input>");
        assert_eq!(message.tool_calls[0].args, json!({"input": "42"}));
    }

    #[test]
    fn test_several_blocks() {
        let message = parse("<tool>a</tool><tool_input>1</tool_input><tool>b</tool><tool_input>2</tool_input>");
        let names: Vec<_> = message.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(message.tool_calls[1].id, "m_call_1");
    }

    #[test]
    fn test_missing_input_is_invalid() {
        let message = parse("<tool>search</tool> and then nothing");
        assert!(message.tool_calls.is_empty());
        let invalid = &message.invalid_tool_calls[0];
        assert_eq!(invalid.name.as_deref(), Some("search"));
        assert!(invalid.error.contains("missing <tool_input>"));
        assert!(message.has_pending_calls());
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let message = parse("<tool> </tool><tool_input>x</tool_input>");
        let invalid = &message.invalid_tool_calls[0];
        assert_eq!(invalid.name, None);
        assert_eq!(invalid.raw_args.as_deref(), Some("x"));
        assert!(invalid.error.starts_with("Failed to parse tool invocation"));
    }
}
