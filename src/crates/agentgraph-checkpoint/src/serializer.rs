//! Serialization protocol for persisted checkpoints

use crate::{checkpoint::Checkpoint, error::Result, migration};

/// Encodes checkpoints for a byte-oriented backing store.
///
/// Decoding always goes through [`migration::upgrade`], so a serializer never
/// hands out a checkpoint in an older layout.
pub trait SerializerProtocol: Send + Sync {
    /// Encode a checkpoint in the current layout
    fn dumps(&self, checkpoint: &Checkpoint) -> Result<Vec<u8>>;

    /// Decode a stored checkpoint of `thread_id`, upgrading older layouts
    fn loads(&self, thread_id: &str, data: &[u8]) -> Result<Checkpoint>;
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps(&self, checkpoint: &Checkpoint) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(checkpoint)?)
    }

    fn loads(&self, thread_id: &str, data: &[u8]) -> Result<Checkpoint> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        migration::upgrade(value, thread_id)
    }
}
