//! Conversation messages and the transcript reducer
//!
//! # Core Types
//!
//! - [`Message`] - one conversation turn, a tagged variant over
//!   [`HumanMessage`], [`AiMessage`], [`ToolResultMessage`] and [`SystemMessage`]
//! - [`Transcript`] - the ordered messages of one thread
//! - [`MessageInput`] / [`MessageLike`] - loosely-typed input accepted by the reducer
//!
//! # The `add_messages` reducer
//!
//! ```text
//!   existing: [h1, a1, t1]          incoming: [a1', h2]
//!                 │                               │
//!                 └──────────── merge ────────────┘
//!                                 │
//!                      [h1, a1', t1, h2]
//!      same id  -> replaced in place, position kept
//!      fresh id -> appended in incoming order
//! ```
//!
//! When `incoming` carries the same id twice, the later message wins.
//! The reducer is pure: no I/O, no clock, no randomness.
//!
//! # Loose input
//!
//! Producers such as model APIs or external state updates hand over plain
//! records. [`MessageInput::into_messages`] coerces them:
//!
//! ```rust
//! use agentgraph_core::messages::{MessageInput, MessageKind};
//! use serde_json::json;
//!
//! let input = MessageInput::from(json!([
//!     {"role": "user", "content": "2+2?"},
//!     {"type": "ai", "content": "4"},
//! ]));
//! let messages = input.into_messages().unwrap();
//! assert_eq!(messages[0].kind(), MessageKind::Human);
//! assert_eq!(messages[1].kind(), MessageKind::Ai);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{AgentError, Result};

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// A model-requested tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Model output that looked like a tool call but could not be parsed into one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidToolCall {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_args: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanMessage {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_tool_calls: Vec<InvalidToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AiMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            content: content.into(),
            tool_calls: Vec::new(),
            invalid_tool_calls: Vec::new(),
            name: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_invalid_tool_calls(mut self, invalid: Vec<InvalidToolCall>) -> Self {
        self.invalid_tool_calls = invalid;
        self
    }

    /// Whether the executor has to visit the tool node for this message
    pub fn has_pending_calls(&self) -> bool {
        !self.tool_calls.is_empty() || !self.invalid_tool_calls.is_empty()
    }

    /// Ids of every call in this message, valid and invalid
    pub fn call_ids(&self) -> impl Iterator<Item = &str> {
        self.tool_calls
            .iter()
            .map(|c| c.id.as_str())
            .chain(self.invalid_tool_calls.iter().map(|c| c.id.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub id: String,
    pub tool_call_id: String,
    /// Structured tool output; plain text results are JSON strings
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResultMessage {
    pub fn success(tool_call_id: impl Into<String>, name: impl Into<String>, content: Value) -> Self {
        Self {
            id: new_message_id(),
            tool_call_id: tool_call_id.into(),
            content,
            name: Some(name.into()),
            is_error: false,
        }
    }

    pub fn error(
        tool_call_id: impl Into<String>,
        name: Option<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            id: new_message_id(),
            tool_call_id: tool_call_id.into(),
            content: Value::String(format!("Error: {}", error)),
            name,
            is_error: true,
        }
    }

    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Discriminant of [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Human,
    Ai,
    ToolResult,
    System,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Human(HumanMessage),
    Ai(AiMessage),
    ToolResult(ToolResultMessage),
    System(SystemMessage),
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Message::Human(HumanMessage {
            id: new_message_id(),
            content: content.into(),
            name: None,
        })
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Message::Ai(AiMessage::new(content))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::System(SystemMessage {
            id: new_message_id(),
            content: content.into(),
        })
    }

    pub fn tool_result(tool_call_id: impl Into<String>, name: impl Into<String>, content: Value) -> Self {
        Message::ToolResult(ToolResultMessage::success(tool_call_id, name, content))
    }

    pub fn id(&self) -> &str {
        match self {
            Message::Human(m) => &m.id,
            Message::Ai(m) => &m.id,
            Message::ToolResult(m) => &m.id,
            Message::System(m) => &m.id,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        match &mut self {
            Message::Human(m) => m.id = id,
            Message::Ai(m) => m.id = id,
            Message::ToolResult(m) => m.id = id,
            Message::System(m) => m.id = id,
        }
        self
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Human(_) => MessageKind::Human,
            Message::Ai(_) => MessageKind::Ai,
            Message::ToolResult(_) => MessageKind::ToolResult,
            Message::System(_) => MessageKind::System,
        }
    }

    /// Text rendering of the content
    pub fn text(&self) -> String {
        match self {
            Message::Human(m) => m.content.clone(),
            Message::Ai(m) => m.content.clone(),
            Message::ToolResult(m) => m.text(),
            Message::System(m) => m.content.clone(),
        }
    }

    pub fn as_ai(&self) -> Option<&AiMessage> {
        match self {
            Message::Ai(m) => Some(m),
            _ => None,
        }
    }
}

impl From<AiMessage> for Message {
    fn from(m: AiMessage) -> Self {
        Message::Ai(m)
    }
}

impl From<ToolResultMessage> for Message {
    fn from(m: ToolResultMessage) -> Self {
        Message::ToolResult(m)
    }
}

/// Ordered, reducer-merged messages of one thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript(Vec<Message>);

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    pub fn into_vec(self) -> Vec<Message> {
        self.0
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.0.iter().find(|m| m.id() == id)
    }

    /// Merge `incoming` through [`add_messages`] in place.
    pub fn merge(&mut self, incoming: Vec<Message>) {
        let existing = std::mem::take(self);
        *self = add_messages(existing, incoming);
    }

    /// Latest ai message, if any
    pub fn last_ai(&self) -> Option<&AiMessage> {
        self.0.iter().rev().find_map(Message::as_ai)
    }

    fn answered_call_ids(&self) -> HashSet<&str> {
        self.0
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult(r) => Some(r.tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Call ids, across the whole transcript, without a matching tool result.
    pub fn unanswered_calls(&self) -> Vec<String> {
        let answered = self.answered_call_ids();
        self.0
            .iter()
            .filter_map(Message::as_ai)
            .flat_map(AiMessage::call_ids)
            .filter(|id| !answered.contains(id))
            .map(str::to_string)
            .collect()
    }

    /// Calls of the latest ai message that still need a tool result
    pub fn pending_calls(&self) -> (Vec<ToolCall>, Vec<InvalidToolCall>) {
        let Some(ai) = self.last_ai() else {
            return (Vec::new(), Vec::new());
        };
        let answered = self.answered_call_ids();
        let calls = ai
            .tool_calls
            .iter()
            .filter(|c| !answered.contains(c.id.as_str()))
            .cloned()
            .collect();
        let invalid = ai
            .invalid_tool_calls
            .iter()
            .filter(|c| !answered.contains(c.id.as_str()))
            .cloned()
            .collect();
        (calls, invalid)
    }

    /// Tool results that reference a call no preceding ai message made
    pub fn orphan_results(&self) -> Vec<String> {
        let mut seen_calls: HashSet<&str> = HashSet::new();
        let mut orphans = Vec::new();
        for message in &self.0 {
            match message {
                Message::Ai(ai) => seen_calls.extend(ai.call_ids()),
                Message::ToolResult(r) if !seen_calls.contains(r.tool_call_id.as_str()) => {
                    orphans.push(r.id.clone())
                }
                _ => {}
            }
        }
        orphans
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        add_messages(Transcript::new(), messages)
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Merge two message lists by id.
///
/// Messages in `right` whose id already exists in `left` replace that entry in
/// place; the rest are appended in order. Duplicate ids inside `right` resolve
/// to the later message.
///
/// ```rust
/// use agentgraph_core::messages::{add_messages, Message, Transcript};
///
/// let left = Transcript::from(vec![Message::human("hi").with_id("1")]);
/// let merged = add_messages(left, vec![
///     Message::human("hello").with_id("1"),
///     Message::ai("hey").with_id("2"),
/// ]);
///
/// assert_eq!(merged.len(), 2);
/// assert_eq!(merged.messages()[0].text(), "hello");
/// ```
pub fn add_messages(left: Transcript, right: Vec<Message>) -> Transcript {
    let mut merged = left.0;
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id().to_string(), i))
        .collect();

    for message in right {
        match index.get(message.id()) {
            Some(&position) => merged[position] = message,
            None => {
                index.insert(message.id().to_string(), merged.len());
                merged.push(message);
            }
        }
    }

    Transcript(merged)
}

/// A message in any of the shapes producers hand over
#[derive(Debug, Clone, PartialEq)]
pub enum MessageLike {
    /// Already typed
    Message(Message),
    /// Loose record: `{"type" | "role": ..., "content": ..., ...}` or a bare string
    Record(Value),
    /// `(role, content)` pair
    Tuple(String, String),
}

impl From<Message> for MessageLike {
    fn from(m: Message) -> Self {
        Self::Message(m)
    }
}

impl From<Value> for MessageLike {
    fn from(v: Value) -> Self {
        Self::Record(v)
    }
}

impl From<(&str, &str)> for MessageLike {
    fn from((role, content): (&str, &str)) -> Self {
        Self::Tuple(role.to_string(), content.to_string())
    }
}

impl From<&str> for MessageLike {
    fn from(content: &str) -> Self {
        Self::Record(Value::String(content.to_string()))
    }
}

impl MessageLike {
    /// Coerce into a typed [`Message`], generating an id when none is given.
    pub fn into_message(self) -> Result<Message> {
        match self {
            MessageLike::Message(m) => Ok(m),
            MessageLike::Tuple(role, content) => {
                let mut fields = Map::new();
                fields.insert("role".to_string(), Value::String(role));
                fields.insert("content".to_string(), Value::String(content));
                coerce_record(fields)
            }
            MessageLike::Record(Value::String(content)) => Ok(Message::human(content)),
            MessageLike::Record(Value::Object(fields)) => coerce_record(fields),
            MessageLike::Record(other) => Err(AgentError::invalid_input(format!(
                "cannot interpret {} as a message",
                other
            ))),
        }
    }
}

/// Input to the reducer: one message or a sequence
#[derive(Debug, Clone, PartialEq)]
pub enum MessageInput {
    One(MessageLike),
    Many(Vec<MessageLike>),
}

impl MessageInput {
    /// Normalise to a sequence of typed messages.
    pub fn into_messages(self) -> Result<Vec<Message>> {
        match self {
            MessageInput::One(like) => Ok(vec![like.into_message()?]),
            MessageInput::Many(likes) => likes.into_iter().map(MessageLike::into_message).collect(),
        }
    }
}

impl From<Message> for MessageInput {
    fn from(m: Message) -> Self {
        Self::One(m.into())
    }
}

impl From<Vec<Message>> for MessageInput {
    fn from(messages: Vec<Message>) -> Self {
        Self::Many(messages.into_iter().map(MessageLike::from).collect())
    }
}

impl From<MessageLike> for MessageInput {
    fn from(like: MessageLike) -> Self {
        Self::One(like)
    }
}

impl From<Vec<MessageLike>> for MessageInput {
    fn from(likes: Vec<MessageLike>) -> Self {
        Self::Many(likes)
    }
}

impl From<&str> for MessageInput {
    fn from(content: &str) -> Self {
        Self::One(content.into())
    }
}

impl From<Value> for MessageInput {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Many(items.into_iter().map(MessageLike::Record).collect()),
            other => Self::One(MessageLike::Record(other)),
        }
    }
}

fn coerce_record(mut fields: Map<String, Value>) -> Result<Message> {
    let kind = fields
        .get("type")
        .or_else(|| fields.get("role"))
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::invalid_input("message record needs a 'type' or 'role'"))?;

    let kind = match kind {
        "human" | "user" => MessageKind::Human,
        "ai" | "assistant" => MessageKind::Ai,
        "tool" | "tool_result" | "function" => MessageKind::ToolResult,
        "system" => MessageKind::System,
        other => {
            return Err(AgentError::invalid_input(format!(
                "unknown message type '{}'",
                other
            )))
        }
    };

    let id = match fields.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => new_message_id(),
    };
    let name = fields
        .remove("name")
        .and_then(|v| v.as_str().map(str::to_string));
    let content = fields.remove("content").unwrap_or(Value::Null);

    let message = match kind {
        MessageKind::Human => Message::Human(HumanMessage {
            id,
            content: content_text(content),
            name,
        }),
        MessageKind::System => Message::System(SystemMessage {
            id,
            content: content_text(content),
        }),
        MessageKind::Ai => {
            let (tool_calls, invalid_tool_calls) =
                coerce_tool_calls(fields.remove("tool_calls").unwrap_or(Value::Null));
            let mut invalid_tool_calls = invalid_tool_calls;
            if let Some(Value::Array(extra)) = fields.remove("invalid_tool_calls") {
                invalid_tool_calls.extend(
                    extra
                        .into_iter()
                        .filter_map(|v| serde_json::from_value::<InvalidToolCall>(v).ok()),
                );
            }
            Message::Ai(AiMessage {
                id,
                content: content_text(content),
                tool_calls,
                invalid_tool_calls,
                name,
            })
        }
        MessageKind::ToolResult => {
            let tool_call_id = fields
                .remove("tool_call_id")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| {
                    AgentError::invalid_input("tool result record needs a 'tool_call_id'")
                })?;
            let is_error = fields.get("is_error").and_then(Value::as_bool).unwrap_or(false)
                || fields.get("status").and_then(Value::as_str) == Some("error");
            Message::ToolResult(ToolResultMessage {
                id,
                tool_call_id,
                content,
                name,
                is_error,
            })
        }
    };

    Ok(message)
}

/// Flatten string, content-part arrays or arbitrary JSON into text.
fn content_text(content: Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("text").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        other => other.to_string(),
    }
}

/// Accepts `{id, name, args}` as well as the nested
/// `{id, function: {name, arguments: "<json>"}}` shape.
fn coerce_tool_calls(raw: Value) -> (Vec<ToolCall>, Vec<InvalidToolCall>) {
    let mut calls = Vec::new();
    let mut invalid = Vec::new();

    let Value::Array(items) = raw else {
        return (calls, invalid);
    };

    for item in items {
        let Value::Object(mut call) = item else {
            continue;
        };
        let id = match call.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => new_message_id(),
        };
        let function = match call.remove("function") {
            Some(Value::Object(f)) => f,
            _ => Map::new(),
        };
        let name = call
            .remove("name")
            .or_else(|| function.get("name").cloned())
            .and_then(|v| v.as_str().map(str::to_string));
        let args = call
            .remove("args")
            .or_else(|| call.remove("arguments"))
            .or_else(|| function.get("arguments").cloned())
            .unwrap_or_else(|| Value::Object(Map::new()));

        let Some(name) = name else {
            invalid.push(InvalidToolCall {
                id,
                name: None,
                raw_args: Some(args.to_string()),
                error: "tool call has no name".to_string(),
            });
            continue;
        };

        match args {
            Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(parsed) => calls.push(ToolCall::new(id, name, parsed)),
                Err(e) => invalid.push(InvalidToolCall {
                    id,
                    name: Some(name),
                    raw_args: Some(raw),
                    error: format!("arguments are not valid JSON: {}", e),
                }),
            },
            parsed => calls.push(ToolCall::new(id, name, parsed)),
        }
    }

    (calls, invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization_is_tagged() {
        let message = Message::ai("4").with_id("a1");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, json!({"type": "ai", "id": "a1", "content": "4"}));

        let restored: Message = serde_json::from_value(value).unwrap();
        assert_eq!(restored, message);
    }

    #[test]
    fn test_replace_keeps_position() {
        let left = Transcript::from(vec![
            Message::human("a").with_id("1"),
            Message::ai("b").with_id("2"),
            Message::human("c").with_id("3"),
        ]);
        let merged = add_messages(left, vec![Message::ai("B").with_id("2")]);

        let texts: Vec<_> = merged.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["a", "B", "c"]);
    }

    #[test]
    fn test_later_duplicate_wins() {
        let merged = add_messages(
            Transcript::new(),
            vec![
                Message::human("first").with_id("x"),
                Message::ai("other").with_id("y"),
                Message::human("second").with_id("x"),
            ],
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.messages()[0].text(), "second");
        assert_eq!(merged.messages()[1].id(), "y");
    }

    #[test]
    fn test_coerce_role_aliases() {
        let input = MessageInput::from(json!([
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": [{"type": "text", "text": "hel"}, {"type": "text", "text": "lo"}]},
            {"role": "system", "content": "be brief"},
            {"role": "tool", "tool_call_id": "c1", "content": {"temp": 64}},
        ]));
        let messages = input.into_messages().unwrap();

        let kinds: Vec<_> = messages.iter().map(Message::kind).collect();
        assert_eq!(
            kinds,
            vec![MessageKind::Human, MessageKind::Ai, MessageKind::System, MessageKind::ToolResult]
        );
        assert_eq!(messages[1].text(), "hello");
        assert!(messages.iter().all(|m| !m.id().is_empty()));
    }

    #[test]
    fn test_coerce_keeps_given_id() {
        let message = MessageLike::from(json!({"type": "human", "id": "h-1", "content": "x"}))
            .into_message()
            .unwrap();
        assert_eq!(message.id(), "h-1");
    }

    #[test]
    fn test_coerce_rejects_unknown_role() {
        let err = MessageLike::from(json!({"role": "robot", "content": "x"}))
            .into_message()
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));

        let err = MessageLike::from(json!({"role": "tool", "content": "x"}))
            .into_message()
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[test]
    fn test_coerce_tool_call_shapes() {
        let message = MessageLike::from(json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [
                {"id": "c1", "name": "search", "args": {"q": "weather"}},
                {"id": "c2", "function": {"name": "lookup", "arguments": "{\"k\": 1}"}},
                {"id": "c3", "function": {"name": "broken", "arguments": "{not json"}},
            ]
        }))
        .into_message()
        .unwrap();

        let ai = message.as_ai().unwrap();
        assert_eq!(ai.tool_calls.len(), 2);
        assert_eq!(ai.tool_calls[1].args, json!({"k": 1}));
        assert_eq!(ai.invalid_tool_calls.len(), 1);
        assert_eq!(ai.invalid_tool_calls[0].name.as_deref(), Some("broken"));
        assert!(ai.has_pending_calls());
    }

    #[test]
    fn test_tuple_and_string_input() {
        let messages = MessageInput::from(vec![
            MessageLike::from(("human", "hi")),
            MessageLike::from("plain text"),
        ])
        .into_messages()
        .unwrap();
        assert_eq!(messages[0].kind(), MessageKind::Human);
        assert_eq!(messages[1].text(), "plain text");
    }

    #[test]
    fn test_pending_and_unanswered_calls() {
        let ai = AiMessage::new("")
            .with_id("a1")
            .with_tool_calls(vec![
                ToolCall::new("c1", "search", json!({})),
                ToolCall::new("c2", "search", json!({})),
            ]);
        let mut transcript = Transcript::from(vec![Message::human("q"), ai.into()]);
        transcript.merge(vec![Message::tool_result("c1", "search", json!("ok"))]);

        assert_eq!(transcript.unanswered_calls(), vec!["c2".to_string()]);
        let (pending, invalid) = transcript.pending_calls();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "c2");
        assert!(invalid.is_empty());
        assert!(transcript.orphan_results().is_empty());
    }

    #[test]
    fn test_orphan_results_detected() {
        let transcript = Transcript::from(vec![
            Message::human("q"),
            Message::tool_result("nope", "search", json!("x")).with_id("t1"),
        ]);
        assert_eq!(transcript.orphan_results(), vec!["t1".to_string()]);
    }
}
