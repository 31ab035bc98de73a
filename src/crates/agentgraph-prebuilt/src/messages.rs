//! Transcript conversion for model families
//!
//! Models that do not accept `tool_result` messages get them as plain human
//! messages instead. The XML strategy renders the whole tool exchange as text:
//!
//! ```text
//!  ai { content, tool_calls: [search {"q": "sf"}] }
//!      → ai "content<tool>search</tool><tool_input>{"q":"sf"}</tool_input>"
//!  tool_result "64 degrees"
//!      → human "<observation>64 degrees</observation>"
//! ```
//!
//! Message ids are kept so converted prompts stay traceable to the transcript.

use agentgraph_core::{AiMessage, HumanMessage, Message, ModelCapabilities, ToolResultMessage, Transcript};
use serde_json::Value;

/// Map message kinds the model cannot take into ones it can
pub fn for_model(transcript: &Transcript, capabilities: ModelCapabilities) -> Vec<Message> {
    transcript
        .iter()
        .map(|message| match message {
            Message::ToolResult(result) if !capabilities.tool_messages => tool_result_as_human(result),
            other => other.clone(),
        })
        .collect()
}

/// Render the transcript in the XML tool protocol
pub fn to_xml(transcript: &Transcript) -> Vec<Message> {
    transcript
        .iter()
        .map(|message| match message {
            Message::Ai(ai) if ai.has_pending_calls() => Message::Ai(AiMessage {
                content: render_calls(ai),
                tool_calls: Vec::new(),
                invalid_tool_calls: Vec::new(),
                ..ai.clone()
            }),
            Message::ToolResult(result) => human(&result.id, format!("<observation>{}</observation>", result.text())),
            other => other.clone(),
        })
        .collect()
}

fn tool_result_as_human(result: &ToolResultMessage) -> Message {
    let name = result.name.as_deref().unwrap_or("tool");
    human(&result.id, format!("Result of {} ({}): {}", name, result.tool_call_id, result.text()))
}

fn human(id: &str, content: String) -> Message {
    Message::Human(HumanMessage {
        id: id.to_string(),
        content,
        name: None,
    })
}

fn render_calls(ai: &AiMessage) -> String {
    let mut out = ai.content.clone();
    for call in &ai.tool_calls {
        let input = match &call.args {
            // `{"input": text}` came from a plain-text tool input
            Value::Object(map) if map.len() == 1 && map.get("input").is_some_and(Value::is_string) => {
                map["input"].as_str().unwrap_or_default().to_string()
            }
            other => other.to_string(),
        };
        out.push_str(&format!("<tool>{}</tool><tool_input>{}</tool_input>", call.name, input));
    }
    for invalid in &ai.invalid_tool_calls {
        out.push_str(&format!(
            "<tool>{}</tool><tool_input>{}</tool_input>",
            invalid.name.as_deref().unwrap_or_default(),
            invalid.raw_args.as_deref().unwrap_or_default()
        ));
    }
    out
}
