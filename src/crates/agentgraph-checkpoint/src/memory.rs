//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointSaver`] keeps every thread's history in insertion order
//! behind a tokio `RwLock`:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Arc<RwLock<HashMap<thread_id, Vec<CP>>>>    │
//! │    "thread-1": [root, step 0, step 1, ...]   │
//! │    "thread-2": [root]                        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Writes take the lock exclusively, so a `put` is atomic with respect to
//! readers. Data is lost when the process exits; use the SQLite saver for
//! durable history.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig},
    error::Result,
    traits::{check_append, AppendCheck, CheckpointSaver},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>;

/// Thread-safe in-memory checkpoint saver
///
/// # Example
///
/// ```rust
/// use agentgraph_checkpoint::{Checkpoint, CheckpointSaver, InMemoryCheckpointSaver};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let saver = InMemoryCheckpointSaver::new();
/// saver.put(Checkpoint::root("thread-1")).await?;
/// assert!(saver.get_latest("thread-1").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with at least one checkpoint
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.last())
            .cloned())
    }

    async fn get(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(thread_id).and_then(|entries| {
            entries
                .iter()
                .find(|checkpoint| checkpoint.id == checkpoint_id)
                .cloned()
        }))
    }

    async fn list_page(
        &self,
        thread_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Checkpoint>> {
        let storage = self.storage.read().await;
        let Some(entries) = storage.get(thread_id) else {
            return Ok(Vec::new());
        };

        let end = match before {
            Some(before_id) => match entries.iter().position(|c| c.id == before_id) {
                Some(index) => index,
                None => return Ok(Vec::new()),
            },
            None => entries.len(),
        };

        Ok(entries[..end].iter().rev().take(limit).cloned().collect())
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<CheckpointConfig> {
        let mut storage = self.storage.write().await;
        let entries = storage.entry(checkpoint.thread_id.clone()).or_default();

        let existing = entries.iter().find(|c| c.id == checkpoint.id);
        let parent_exists = checkpoint
            .parent_id
            .as_ref()
            .is_some_and(|parent_id| entries.iter().any(|c| &c.id == parent_id));

        let config = checkpoint.config();
        match check_append(&checkpoint, existing, entries.is_empty(), parent_exists) {
            Ok(AppendCheck::Insert) => {
                entries.push(checkpoint);
                Ok(config)
            }
            Ok(AppendCheck::AlreadyStored) => Ok(config),
            Err(err) => {
                if entries.is_empty() {
                    storage.remove(&config.thread_id);
                }
                Err(err)
            }
        }
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}
