//! Command handlers for the `agentgraph` binary
//!
//! Handlers render their report into a `String`; the binary prints it.
//! Everything reads from or writes to one SQLite checkpoint database.

pub mod maintenance;
pub mod threads;

use agentgraph_checkpoint::{CheckpointSource, SqliteCheckpointSaver};
use agentgraph_core::ThreadStore;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

/// An open checkpoint database
#[derive(Clone)]
pub struct Database {
    saver: Arc<SqliteCheckpointSaver>,
}

impl Database {
    /// Open the file, creating it and its parent directory if needed
    pub async fn open(path: &Path) -> Result<Self> {
        let saver = SqliteCheckpointSaver::open(path).await?;
        info!(path = %path.display(), "Opened checkpoint database");
        Ok(Self { saver: Arc::new(saver) })
    }

    pub fn from_saver(saver: Arc<SqliteCheckpointSaver>) -> Self {
        Self { saver }
    }

    pub fn saver(&self) -> &Arc<SqliteCheckpointSaver> {
        &self.saver
    }

    pub fn threads(&self) -> ThreadStore {
        ThreadStore::new(self.saver.clone())
    }
}

pub(crate) fn source_label(source: CheckpointSource) -> &'static str {
    match source {
        CheckpointSource::Input => "input",
        CheckpointSource::Loop => "loop",
        CheckpointSource::Update => "update",
    }
}

/// `-` for an empty list
pub(crate) fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(",")
    }
}
