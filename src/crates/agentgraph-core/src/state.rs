//! Agent state and thread-level state operations
//!
//! [`AgentState`] is the typed view of a checkpoint's channels:
//!
//! | Channel    | Type            | Written by                         |
//! |------------|-----------------|------------------------------------|
//! | `messages` | [`Transcript`]  | input, every step, `update_state`  |
//! | `examples` | `Vec<Example>`  | input checkpoint of a run          |
//!
//! [`ThreadStore`] layers the read/edit operations of a thread on top of a
//! [`CheckpointSaver`]: current state, history, external updates, deletion.

use agentgraph_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
};
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AgentError, Result};
use crate::examples::Example;
use crate::executor::{cancel_pending, Node};
use crate::messages::{Message, MessageInput, Transcript};

pub const MESSAGES_CHANNEL: &str = "messages";
pub const EXAMPLES_CHANNEL: &str = "examples";

/// Typed channels of one checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub messages: Transcript,
    #[serde(default)]
    pub examples: Vec<Example>,
}

impl AgentState {
    pub fn new(messages: Transcript) -> Self {
        Self {
            messages,
            examples: Vec::new(),
        }
    }

    /// Decode the channels of `checkpoint`.
    ///
    /// Message records that are not in the current typed layout are coerced
    /// the way loose input is, so states written by other producers load.
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Result<Self> {
        let messages = match checkpoint.channel_values.get(MESSAGES_CHANNEL) {
            None | Some(Value::Null) => Transcript::new(),
            Some(value) => decode_transcript(value).map_err(|e| {
                AgentError::InvalidState(format!(
                    "checkpoint {} of thread '{}' has unreadable messages: {}",
                    checkpoint.id, checkpoint.thread_id, e
                ))
            })?,
        };
        let examples = checkpoint.channel::<Vec<Example>>(EXAMPLES_CHANNEL)?.unwrap_or_default();
        Ok(Self { messages, examples })
    }

    /// Write channels that differ from `previous` into `checkpoint`.
    ///
    /// Unchanged channels keep their version.
    pub fn write_into(&self, checkpoint: &mut Checkpoint, previous: &AgentState) -> Result<()> {
        if self.messages != previous.messages || !checkpoint.channel_values.contains_key(MESSAGES_CHANNEL) {
            checkpoint.write_channel(MESSAGES_CHANNEL, serde_json::to_value(&self.messages)?);
        }
        if self.examples != previous.examples {
            checkpoint.write_channel(EXAMPLES_CHANNEL, serde_json::to_value(&self.examples)?);
        }
        Ok(())
    }
}

fn decode_transcript(value: &Value) -> Result<Transcript> {
    if let Ok(transcript) = serde_json::from_value::<Transcript>(value.clone()) {
        return Ok(transcript);
    }
    let messages = MessageInput::from(value.clone()).into_messages()?;
    Ok(Transcript::from(messages))
}

/// State of a thread at one checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub parent_checkpoint_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub values: AgentState,
    /// Nodes the thread resumes at; empty when finished
    pub next: Vec<String>,
    pub metadata: CheckpointMetadata,
}

impl StateSnapshot {
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Result<Self> {
        Ok(Self {
            thread_id: checkpoint.thread_id.clone(),
            checkpoint_id: checkpoint.id.clone(),
            parent_checkpoint_id: checkpoint.parent_id.clone(),
            created_at: checkpoint.ts,
            values: AgentState::from_checkpoint(checkpoint)?,
            next: checkpoint.metadata.next.clone(),
            metadata: checkpoint.metadata.clone(),
        })
    }

    pub fn messages(&self) -> &Transcript {
        &self.values.messages
    }

    pub fn is_finished(&self) -> bool {
        self.next.is_empty()
    }
}

/// Read and edit operations on thread state
#[derive(Clone)]
pub struct ThreadStore {
    saver: Arc<dyn CheckpointSaver>,
}

impl ThreadStore {
    pub fn new(saver: Arc<dyn CheckpointSaver>) -> Self {
        Self { saver }
    }

    pub fn saver(&self) -> &Arc<dyn CheckpointSaver> {
        &self.saver
    }

    /// Latest state, `None` if the thread never ran
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<StateSnapshot>> {
        self.saver
            .get_latest(thread_id)
            .await?
            .as_ref()
            .map(StateSnapshot::from_checkpoint)
            .transpose()
    }

    /// State at a specific checkpoint
    pub async fn get_state_at(&self, config: &CheckpointConfig) -> Result<Option<StateSnapshot>> {
        let checkpoint = match &config.checkpoint_id {
            Some(checkpoint_id) => self.saver.get(&config.thread_id, checkpoint_id).await?,
            None => self.saver.get_latest(&config.thread_id).await?,
        };
        checkpoint.as_ref().map(StateSnapshot::from_checkpoint).transpose()
    }

    /// Past states, most recent first
    pub async fn get_history(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<StateSnapshot>> {
        let stream = self.saver.list(thread_id);
        let checkpoints: Vec<Checkpoint> = match limit {
            Some(limit) => stream.take(limit).try_collect().await?,
            None => stream.try_collect().await?,
        };
        checkpoints.iter().map(StateSnapshot::from_checkpoint).collect()
    }

    /// Merge messages into the thread outside of a run.
    ///
    /// Writes an `update` checkpoint whose `next` is inherited from the
    /// latest one, so an interrupted thread resumes where it paused. On a
    /// thread that never ran the update becomes its first checkpoint.
    ///
    /// A human message on a thread with unanswered tool calls cancels those
    /// calls first, the same way new run input does, and the thread resumes
    /// at `agent`. Tool results and edits leave pending calls alone.
    pub async fn update_state(
        &self,
        thread_id: &str,
        messages: impl Into<MessageInput>,
    ) -> Result<CheckpointConfig> {
        if thread_id.trim().is_empty() {
            return Err(AgentError::invalid_input("thread id must not be empty"));
        }
        let incoming: Vec<Message> = messages.into().into_messages()?;

        let latest = self.saver.get_latest(thread_id).await?;
        let (mut checkpoint, previous) = match &latest {
            Some(latest) => {
                let next = latest.metadata.next.clone();
                let checkpoint = latest.child(CheckpointSource::Update);
                let step = checkpoint.metadata.step;
                let checkpoint = checkpoint
                    .with_metadata(CheckpointMetadata::new(CheckpointSource::Update, step).with_next(next));
                (checkpoint, AgentState::from_checkpoint(latest)?)
            }
            None => {
                let checkpoint = Checkpoint::root(thread_id)
                    .with_metadata(CheckpointMetadata::new(CheckpointSource::Update, -1));
                (checkpoint, AgentState::default())
            }
        };

        let mut state = previous.clone();
        if incoming.iter().any(|m| matches!(m, Message::Human(_))) {
            let cancelled = cancel_pending(&state.messages, "a human message arrived before the call ran");
            if !cancelled.is_empty() {
                info!(thread_id = %thread_id, calls = cancelled.len(), "Cancelling pending tool calls");
                state.messages.merge(cancelled);
                checkpoint.metadata.next = vec![Node::Agent.as_str().to_string()];
            }
        }
        state.messages.merge(incoming);
        state.write_into(&mut checkpoint, &previous)?;

        let config = self.saver.put(checkpoint).await?;
        debug!(thread_id = %thread_id, checkpoint_id = ?config.checkpoint_id, "State updated");
        Ok(config)
    }

    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.saver.delete_thread(thread_id).await?;
        info!(thread_id = %thread_id, "Thread deleted");
        Ok(())
    }
}

impl std::fmt::Debug for ThreadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{AiMessage, ToolCall, ToolResultMessage};
    use agentgraph_checkpoint::InMemoryCheckpointSaver;
    use serde_json::json;

    fn store() -> ThreadStore {
        ThreadStore::new(Arc::new(InMemoryCheckpointSaver::new()))
    }

    #[test]
    fn test_state_roundtrip_through_checkpoint() {
        let state = AgentState {
            messages: Transcript::from(vec![Message::human("hi"), Message::ai("hello")]),
            examples: vec![Example::new("q", "a")],
        };
        let mut checkpoint = Checkpoint::root("t1");
        state.write_into(&mut checkpoint, &AgentState::default()).unwrap();

        assert_eq!(checkpoint.version_of(MESSAGES_CHANNEL), 1);
        assert_eq!(checkpoint.version_of(EXAMPLES_CHANNEL), 1);
        assert_eq!(AgentState::from_checkpoint(&checkpoint).unwrap(), state);
    }

    #[test]
    fn test_unchanged_channels_keep_version() {
        let state = AgentState {
            messages: Transcript::from(vec![Message::human("hi")]),
            examples: vec![Example::new("q", "a")],
        };
        let mut first = Checkpoint::root("t1");
        state.write_into(&mut first, &AgentState::default()).unwrap();

        let mut next_state = state.clone();
        next_state.messages.merge(vec![Message::ai("yo")]);
        let mut second = first.child(CheckpointSource::Loop);
        next_state.write_into(&mut second, &state).unwrap();

        assert_eq!(second.version_of(MESSAGES_CHANNEL), 2);
        assert_eq!(second.version_of(EXAMPLES_CHANNEL), 1);
    }

    #[test]
    fn test_loose_records_are_coerced() {
        let checkpoint = Checkpoint::root("t1").with_channel(
            MESSAGES_CHANNEL,
            json!([{"role": "user", "content": "hi", "id": "h1"}]),
        );
        let state = AgentState::from_checkpoint(&checkpoint).unwrap();
        assert_eq!(state.messages.messages()[0].id(), "h1");

        let broken = Checkpoint::root("t1").with_channel(MESSAGES_CHANNEL, json!([{"role": "robot"}]));
        assert!(matches!(
            AgentState::from_checkpoint(&broken),
            Err(AgentError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_update_state_preserves_next() {
        let store = store();
        let root = Checkpoint::root("t1")
            .with_channel(MESSAGES_CHANNEL, json!([]))
            .with_metadata(CheckpointMetadata::new(CheckpointSource::Loop, 0).with_next(vec!["action".into()]));
        store.saver().put(root.clone()).await.unwrap();

        store
            .update_state("t1", Message::human("note").with_id("n1"))
            .await
            .unwrap();

        let snapshot = store.get_state("t1").await.unwrap().unwrap();
        assert_eq!(snapshot.parent_checkpoint_id.as_deref(), Some(root.id.as_str()));
        assert_eq!(snapshot.next, vec!["action".to_string()]);
        assert_eq!(snapshot.metadata.source, CheckpointSource::Update);
        assert_eq!(snapshot.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_human_update_cancels_pending_calls() {
        let store = store();
        let paused = AgentState {
            messages: Transcript::from(vec![
                Message::human("weather?"),
                Message::Ai(
                    AiMessage::new("")
                        .with_tool_calls(vec![ToolCall::new("c1", "search", json!({"q": "weather"}))]),
                ),
            ]),
            examples: Vec::new(),
        };
        let mut root = Checkpoint::root("t1")
            .with_metadata(CheckpointMetadata::new(CheckpointSource::Loop, 0).with_next(vec!["action".into()]));
        paused.write_into(&mut root, &AgentState::default()).unwrap();
        store.saver().put(root).await.unwrap();

        store.update_state("t1", "never mind").await.unwrap();

        let snapshot = store.get_state("t1").await.unwrap().unwrap();
        assert_eq!(snapshot.next, vec!["agent".to_string()]);
        let messages = snapshot.messages().messages();
        assert_eq!(messages.len(), 4);
        match &messages[2] {
            Message::ToolResult(result) => {
                assert_eq!(result.tool_call_id, "c1");
                assert!(result.is_error);
            }
            other => panic!("expected a tool result, got {:?}", other),
        }
        assert_eq!(messages[3].text(), "never mind");
        assert!(snapshot.messages().pending_calls().0.is_empty());
    }

    #[tokio::test]
    async fn test_tool_result_update_keeps_action_pending() {
        let store = store();
        let paused = AgentState {
            messages: Transcript::from(vec![Message::Ai(
                AiMessage::new("").with_tool_calls(vec![ToolCall::new("c1", "search", json!({}))]),
            )]),
            examples: Vec::new(),
        };
        let mut root = Checkpoint::root("t1")
            .with_metadata(CheckpointMetadata::new(CheckpointSource::Loop, 0).with_next(vec!["action".into()]));
        paused.write_into(&mut root, &AgentState::default()).unwrap();
        store.saver().put(root).await.unwrap();

        store
            .update_state("t1", Message::ToolResult(ToolResultMessage::success("c1", "search", json!("sunny"))))
            .await
            .unwrap();

        let snapshot = store.get_state("t1").await.unwrap().unwrap();
        assert_eq!(snapshot.next, vec!["action".to_string()]);
        assert_eq!(snapshot.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_update_state_seeds_new_thread() {
        let store = store();
        store.update_state("fresh", "hello").await.unwrap();

        let snapshot = store.get_state("fresh").await.unwrap().unwrap();
        assert!(snapshot.parent_checkpoint_id.is_none());
        assert!(snapshot.is_finished());
        assert_eq!(snapshot.messages().messages()[0].text(), "hello");
    }

    #[tokio::test]
    async fn test_history_and_delete() {
        let store = store();
        for text in ["a", "b", "c"] {
            store.update_state("t1", text).await.unwrap();
        }

        let history = store.get_history("t1", None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].messages().len(), 3);
        assert_eq!(history[2].messages().len(), 1);
        assert_eq!(store.get_history("t1", Some(2)).await.unwrap().len(), 2);

        let at = store
            .get_state_at(&CheckpointConfig::new("t1").with_checkpoint_id(history[1].checkpoint_id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(at.messages().len(), 2);

        store.delete_thread("t1").await.unwrap();
        assert!(store.get_state("t1").await.unwrap().is_none());
    }
}
