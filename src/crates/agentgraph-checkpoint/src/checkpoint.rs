//! Core checkpoint data structures
//!
//! A [`Checkpoint`] is an immutable snapshot of every state channel of one
//! thread after one executor step. Checkpoints of a thread form a chain via
//! `parent_id`:
//!
//! ```text
//!   root (parent_id = None, source = input)
//!     └── step 0 (source = loop, next = ["action"])
//!           └── step 1 (source = loop, next = ["agent"])
//!                 └── step 2 (source = loop, next = [])
//! ```
//!
//! Channel values are plain JSON under an explicit schema version (`v`), so an
//! upgrade is a data-level transformation (see [`crate::migration`]) rather
//! than a reinterpretation of opaque bytes.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::Result;

/// Unique identifier of a checkpoint within its thread (UUIDv7 text form)
pub type CheckpointId = String;

/// Channel name -> serialized channel value
pub type ChannelValues = BTreeMap<String, Value>;

/// Channel name -> write counter. Incremented every time the channel is written.
pub type ChannelVersions = BTreeMap<String, u64>;

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Caller input merged before the first step of a run
    Input,
    /// Written after a node of the executor loop
    Loop,
    /// Manual state update outside of a run
    Update,
}

/// Metadata stored alongside every checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMetadata {
    pub source: CheckpointSource,

    /// Step index within the thread. The root input checkpoint is `-1`; every
    /// later checkpoint is its parent's step plus one.
    pub step: i64,

    /// Nodes pending after this checkpoint. Empty once the thread has finished.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<String>,

    /// Set when the run was cut short by its step or time budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CheckpointMetadata {
    pub fn new(source: CheckpointSource, step: i64) -> Self {
        Self {
            source,
            step,
            next: Vec::new(),
            stop_reason: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_next(mut self, next: Vec<String>) -> Self {
        self.next = next;
        self
    }

    pub fn with_stop_reason(mut self, reason: impl Into<String>) -> Self {
        self.stop_reason = Some(reason.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl Default for CheckpointMetadata {
    fn default() -> Self {
        Self::new(CheckpointSource::Input, -1)
    }
}

/// State snapshot of one thread at one point in its execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Schema version of this layout
    pub v: u64,

    pub id: CheckpointId,

    pub thread_id: String,

    /// `None` only for the first checkpoint of a thread
    #[serde(default)]
    pub parent_id: Option<CheckpointId>,

    pub ts: DateTime<Utc>,

    pub channel_values: ChannelValues,

    pub channel_versions: ChannelVersions,

    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    pub const CURRENT_VERSION: u64 = 2;

    /// First checkpoint of a thread: no parent, no channels.
    pub fn root(thread_id: impl Into<String>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: new_checkpoint_id(),
            thread_id: thread_id.into(),
            parent_id: None,
            ts: Utc::now(),
            channel_values: ChannelValues::new(),
            channel_versions: ChannelVersions::new(),
            metadata: CheckpointMetadata::default(),
        }
    }

    /// Successor of `self` carrying the same channels, a fresh id and the
    /// given metadata. Channels written afterwards through
    /// [`Checkpoint::write_channel`] get their version bumped.
    pub fn child(&self, source: CheckpointSource) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: new_checkpoint_id(),
            thread_id: self.thread_id.clone(),
            parent_id: Some(self.id.clone()),
            ts: Utc::now(),
            channel_values: self.channel_values.clone(),
            channel_versions: self.channel_versions.clone(),
            metadata: CheckpointMetadata::new(source, self.metadata.step + 1),
        }
    }

    /// Write a channel value and increment its version.
    pub fn write_channel(&mut self, channel: &str, value: Value) {
        self.channel_values.insert(channel.to_string(), value);
        *self.channel_versions.entry(channel.to_string()).or_insert(0) += 1;
    }

    pub fn with_channel(mut self, channel: &str, value: Value) -> Self {
        self.write_channel(channel, value);
        self
    }

    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Decode a channel into a typed value. Missing channels yield `None`.
    pub fn channel<T: DeserializeOwned>(&self, channel: &str) -> Result<Option<T>> {
        self.channel_values
            .get(channel)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(Into::into)
    }

    pub fn version_of(&self, channel: &str) -> u64 {
        self.channel_versions.get(channel).copied().unwrap_or(0)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Address of this checkpoint
    pub fn config(&self) -> CheckpointConfig {
        CheckpointConfig::new(self.thread_id.clone()).with_checkpoint_id(self.id.clone())
    }
}

/// Address of a checkpoint: a thread plus, optionally, one point in it.
/// Also returned by `put` as confirmation of a durable write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CheckpointConfig {
    pub thread_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,
}

impl CheckpointConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_id: None,
        }
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }
}

/// Time-ordered checkpoint id. UUIDv7 keeps ids generated by one process
/// monotonic, which is what thread histories rely on.
pub fn new_checkpoint_id() -> CheckpointId {
    Uuid::now_v7().to_string()
}
