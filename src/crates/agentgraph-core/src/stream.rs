//! Run events and the streaming adapter
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  spawned run task                          │
//! │                                            │
//! │  AgentStep ── message_delta ──┐            │
//! │  GraphExecutor ─ step_complete┤            │
//! │  Runner ── run_complete/error ┤            │
//! │                               ↓            │
//! │                         EventEmitter       │
//! └───────────────────────────────┬────────────┘
//!                                 │ mpsc::channel(100)
//!                                 ↓
//!                           EventStream ──→ consumer
//! ```
//!
//! The channel is bounded, so a slow consumer applies backpressure to the
//! run. Dropping the [`EventStream`] closes the channel; the executor checks
//! [`EventEmitter::is_closed`] before every step and stops scheduling work.
//! A step already in flight finishes and is checkpointed.
//!
//! Every stream ends with exactly one terminal event: `run_complete` or
//! `run_error`.

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::Verbosity;
use crate::error::AgentError;
use crate::executor::{Node, RunOutcome};
use crate::llm::MessageChunk;
use crate::messages::Message;

/// Buffer between the run task and the consumer
pub const EVENT_BUFFER: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageDelta,
    StepComplete,
    RunComplete,
    RunError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageDelta => "message_delta",
            EventKind::StepComplete => "step_complete",
            EventKind::RunComplete => "run_complete",
            EventKind::RunError => "run_error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named event with a JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "event")]
    pub kind: EventKind,
    pub data: Value,
}

impl Event {
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self { kind, data }
    }

    pub fn message_delta(run_id: &str, chunk: &MessageChunk) -> Self {
        Self::new(
            EventKind::MessageDelta,
            json!({
                "run_id": run_id,
                "message_id": chunk.message_id,
                "content": chunk.content,
                "tool_call_chunks": chunk.tool_call_chunks,
            }),
        )
    }

    /// `messages` is the whole transcript or the step's additions, per `verbosity`.
    pub fn step_complete(
        run_id: &str,
        step: usize,
        node: Node,
        next: Option<Node>,
        checkpoint_id: &str,
        verbosity: Verbosity,
        messages: &[Message],
    ) -> Self {
        Self::new(
            EventKind::StepComplete,
            json!({
                "run_id": run_id,
                "step": step,
                "node": node,
                "next": next,
                "checkpoint_id": checkpoint_id,
                "verbosity": verbosity,
                "messages": messages,
            }),
        )
    }

    pub fn run_complete(outcome: &RunOutcome) -> Self {
        Self::new(
            EventKind::RunComplete,
            json!({
                "run_id": outcome.run_id,
                "thread_id": outcome.thread_id,
                "status": outcome.status,
                "steps": outcome.steps,
                "checkpoint_id": outcome.checkpoint_id,
                "next": outcome.next,
            }),
        )
    }

    pub fn run_error(run_id: &str, thread_id: &str, error: &AgentError) -> Self {
        Self::new(
            EventKind::RunError,
            json!({
                "run_id": run_id,
                "thread_id": thread_id,
                "kind": error.kind(),
                "error": error.to_string(),
            }),
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::RunComplete | EventKind::RunError)
    }

    /// Render as a server-sent-events frame
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind, self.data)
    }
}

/// Sending half held by the run task
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<Event>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Emitter plus the stream that receives its events
    pub fn channel(run_id: impl Into<String>) -> (EventEmitter, EventStream) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (
            EventEmitter::new(tx),
            EventStream {
                run_id: run_id.into(),
                inner: ReceiverStream::new(rx),
            },
        )
    }

    /// Send an event, waiting for buffer space.
    ///
    /// Returns `false` once the consumer has gone away; the event is dropped.
    pub async fn emit(&self, event: Event) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Whether the consumer dropped the stream
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half handed to the consumer. Not replayable.
#[derive(Debug)]
pub struct EventStream {
    run_id: String,
    inner: ReceiverStream<Event>,
}

impl EventStream {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
