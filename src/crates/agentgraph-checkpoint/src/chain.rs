//! Parent-chain verification for thread histories

use crate::{
    checkpoint::CheckpointId,
    error::{CheckpointError, Result},
    traits::CheckpointSaver,
};
use futures::TryStreamExt;
use std::collections::HashSet;

/// Result of walking a thread's parent chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub thread_id: String,
    /// Latest checkpoint the walk started from
    pub head: Option<CheckpointId>,
    /// Checkpoints visited from head to root, both included
    pub length: usize,
    /// Checkpoints stored for the thread
    pub total: usize,
}

impl ChainReport {
    /// Every stored checkpoint lies on the head's chain, i.e. no forks.
    pub fn is_linear(&self) -> bool {
        self.length == self.total
    }
}

/// Walk `parent_id` links from the latest checkpoint down to the root.
///
/// Fails with [`CheckpointError::Invalid`] when a parent is missing or a
/// checkpoint is reached twice.
pub async fn verify_chain(saver: &dyn CheckpointSaver, thread_id: &str) -> Result<ChainReport> {
    let total = saver
        .list(thread_id)
        .try_fold(0usize, |count, _| async move { Ok(count + 1) })
        .await?;

    let Some(head) = saver.get_latest(thread_id).await? else {
        return Ok(ChainReport {
            thread_id: thread_id.to_string(),
            head: None,
            length: 0,
            total,
        });
    };

    let head_id = head.id.clone();
    let mut visited = HashSet::new();
    let mut current = head;
    loop {
        if !visited.insert(current.id.clone()) {
            return Err(CheckpointError::Invalid(format!(
                "cycle detected at checkpoint {} in thread {}",
                current.id, thread_id
            )));
        }
        if visited.len() > total {
            return Err(CheckpointError::Invalid(format!(
                "chain of thread {} is longer than its history",
                thread_id
            )));
        }

        let Some(parent_id) = current.parent_id.clone() else {
            break;
        };
        let child_id = current.id.clone();
        current = saver.get(thread_id, &parent_id).await?.ok_or_else(|| {
            CheckpointError::Invalid(format!(
                "checkpoint {} references missing parent {}",
                child_id, parent_id
            ))
        })?;
    }

    tracing::debug!(thread_id = %thread_id, length = visited.len(), total, "Verified checkpoint chain");

    Ok(ChainReport {
        thread_id: thread_id.to_string(),
        head: Some(head_id),
        length: visited.len(),
        total,
    })
}
