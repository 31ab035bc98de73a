//! # agentgraph-checkpoint - Thread History Persistence
//!
//! Append-only checkpoint storage for agent threads. Every executor step of a
//! thread produces one immutable [`Checkpoint`] holding all state channels
//! (`messages`, `examples`, ...) plus a back-pointer to its parent, so the
//! history of a thread is a chain that can be inspected, resumed or forked.
//!
//! ## Core Concepts
//!
//! ### 1. CheckpointSaver Trait
//!
//! [`CheckpointSaver`] is the interface every backend implements:
//!
//! - **`get_latest()`** - Most recent checkpoint of a thread
//! - **`get()`** - Point lookup by checkpoint id
//! - **`list()`** - Lazy, paged history, most recent first
//! - **`put()`** - Append with chain validation
//! - **`delete_thread()`** - Drop a thread's history
//!
//! ### 2. Backends
//!
//! - [`InMemoryCheckpointSaver`] - Process-local, for tests and development
//! - [`SqliteCheckpointSaver`] - Durable relational store (feature `sqlite`, on by default)
//!
//! ### 3. Schema Versions
//!
//! Stored checkpoints are tagged with a schema version. [`migration::upgrade`]
//! turns any supported version into the current layout and rejects unknown
//! ones instead of guessing.
//!
//! ## Quick Start
//!
//! ```rust
//! use agentgraph_checkpoint::{Checkpoint, CheckpointSaver, CheckpointSource, InMemoryCheckpointSaver};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let saver = InMemoryCheckpointSaver::new();
//!
//! let root = Checkpoint::root("thread-1").with_channel("messages", json!([]));
//! saver.put(root.clone()).await?;
//!
//! let next = root.child(CheckpointSource::Loop);
//! saver.put(next).await?;
//!
//! let report = agentgraph_checkpoint::verify_chain(&saver, "thread-1").await?;
//! assert_eq!(report.length, 2);
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod migration;
pub mod serializer;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

// Re-export main types
pub use chain::{verify_chain, ChainReport};
pub use checkpoint::{
    new_checkpoint_id, ChannelValues, ChannelVersions, Checkpoint, CheckpointConfig,
    CheckpointId, CheckpointMetadata, CheckpointSource,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{JsonSerializer, SerializerProtocol};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream, LIST_PAGE_SIZE};
