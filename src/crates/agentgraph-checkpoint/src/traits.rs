//! The [`CheckpointSaver`] trait implemented by every persistence backend
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │  CheckpointSaver                                   │
//! │                                                    │
//! │   get_latest(thread)            -> Option<CP>      │
//! │   get(thread, id)               -> Option<CP>      │
//! │   list_page(thread, before, n)  -> Vec<CP>         │
//! │   put(CP)                       -> CheckpointConfig│
//! │   delete_thread(thread)                            │
//! │                                                    │
//! │   list(thread) ── lazily pages through list_page   │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! Stores are append-only. `put` enforces the chain rules shared by every
//! backend (see [`check_append`]) so a thread history is always a tree rooted
//! in exactly one parentless checkpoint.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointId},
    error::{CheckpointError, Result},
};
use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use std::pin::Pin;

/// Lazy stream of checkpoints, most recent first
pub type CheckpointStream<'a> = Pin<Box<dyn Stream<Item = Result<Checkpoint>> + Send + 'a>>;

/// Page size used by the default [`CheckpointSaver::list`]
pub const LIST_PAGE_SIZE: usize = 32;

/// Persistence backend for thread checkpoints.
///
/// Implementations must make each `put` atomic: concurrent readers observe
/// either the full checkpoint or nothing.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Most recently written checkpoint of a thread, `None` if the thread never ran.
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Point lookup. Absent checkpoints yield `None`, never an error.
    async fn get(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>>;

    /// One page of history, most recent first, strictly older than `before`
    /// when given. An unknown `before` yields an empty page.
    async fn list_page(
        &self,
        thread_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Checkpoint>>;

    /// Append a checkpoint. Re-putting an identical checkpoint is a no-op;
    /// re-using its id with different content is a [`CheckpointError::Conflict`].
    async fn put(&self, checkpoint: Checkpoint) -> Result<CheckpointConfig>;

    /// Remove every checkpoint of a thread.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Full history of a thread, most recent first.
    ///
    /// Pages are fetched on demand so arbitrarily long histories are never
    /// loaded at once. Calling `list` again restarts from the latest checkpoint.
    fn list<'a>(&'a self, thread_id: &'a str) -> CheckpointStream<'a> {
        struct Cursor {
            before: Option<CheckpointId>,
            exhausted: bool,
        }

        let start = Cursor {
            before: None,
            exhausted: false,
        };

        let pages = stream::try_unfold(start, move |cursor| async move {
            if cursor.exhausted {
                return Ok::<_, CheckpointError>(None);
            }
            let page = self
                .list_page(thread_id, cursor.before.as_deref(), LIST_PAGE_SIZE)
                .await?;
            if page.is_empty() {
                return Ok(None);
            }
            let next = Cursor {
                before: page.last().map(|checkpoint| checkpoint.id.clone()),
                exhausted: page.len() < LIST_PAGE_SIZE,
            };
            Ok(Some((page, next)))
        });

        Box::pin(
            pages
                .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
                .try_flatten(),
        )
    }
}

/// Outcome of validating a checkpoint against the existing thread history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendCheck {
    /// New checkpoint, must be written
    Insert,
    /// Identical checkpoint already stored
    AlreadyStored,
}

/// Validate an append against the thread's current history.
///
/// * `existing` - a stored checkpoint with the same id, if any
/// * `thread_is_empty` - whether the thread has any checkpoint yet
/// * `parent_exists` - whether `checkpoint.parent_id` resolves in the thread
pub fn check_append(
    checkpoint: &Checkpoint,
    existing: Option<&Checkpoint>,
    thread_is_empty: bool,
    parent_exists: bool,
) -> Result<AppendCheck> {
    if checkpoint.thread_id.is_empty() {
        return Err(CheckpointError::Invalid("thread_id is required".to_string()));
    }

    if let Some(existing) = existing {
        if existing == checkpoint {
            return Ok(AppendCheck::AlreadyStored);
        }
        return Err(CheckpointError::Conflict {
            thread_id: checkpoint.thread_id.clone(),
            checkpoint_id: checkpoint.id.clone(),
        });
    }

    match &checkpoint.parent_id {
        None if !thread_is_empty => Err(CheckpointError::Invalid(format!(
            "thread {} already has history; checkpoint {} must name a parent",
            checkpoint.thread_id, checkpoint.id
        ))),
        Some(parent_id) if parent_id == &checkpoint.id => Err(CheckpointError::Invalid(format!(
            "checkpoint {} cannot be its own parent",
            checkpoint.id
        ))),
        Some(parent_id) if !parent_exists => Err(CheckpointError::Invalid(format!(
            "parent checkpoint {} not found in thread {}",
            parent_id, checkpoint.thread_id
        ))),
        _ => Ok(AppendCheck::Insert),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointSource;

    #[test]
    fn test_root_accepted_on_empty_thread() {
        let root = Checkpoint::root("t");
        assert_eq!(
            check_append(&root, None, true, false).unwrap(),
            AppendCheck::Insert
        );
    }

    #[test]
    fn test_second_root_rejected() {
        let root = Checkpoint::root("t");
        let err = check_append(&root, None, false, false).unwrap_err();
        assert!(matches!(err, CheckpointError::Invalid(_)));
    }

    #[test]
    fn test_missing_parent_rejected() {
        let child = Checkpoint::root("t").child(CheckpointSource::Loop);
        let err = check_append(&child, None, false, false).unwrap_err();
        assert!(matches!(err, CheckpointError::Invalid(_)));
    }

    #[test]
    fn test_identical_reput_is_idempotent() {
        let root = Checkpoint::root("t");
        assert_eq!(
            check_append(&root, Some(&root), false, false).unwrap(),
            AppendCheck::AlreadyStored
        );
    }

    #[test]
    fn test_divergent_reput_conflicts() {
        let root = Checkpoint::root("t");
        let mut altered = root.clone();
        altered.write_channel("messages", serde_json::json!([]));

        let err = check_append(&altered, Some(&root), false, false).unwrap_err();
        assert!(matches!(err, CheckpointError::Conflict { .. }));
    }
}
