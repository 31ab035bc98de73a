//! Schema versioning for persisted checkpoints
//!
//! Every stored checkpoint carries a `v` tag. Loading dispatches on it:
//!
//! | `v`      | Layout                                                     |
//! |----------|------------------------------------------------------------|
//! | 2        | Current [`Checkpoint`] layout                               |
//! | 1 / none | Legacy key-value layout (`thread_ts` / `parent_ts`)         |
//! | other    | Rejected with [`CheckpointError::UnsupportedVersion`]       |
//!
//! The legacy layout addressed checkpoints by timestamp strings, used mixed
//! int/float/string channel versions and stored messages without ids. The
//! upgrade keeps the timestamp as the checkpoint id, collapses versions to
//! counters and assigns deterministic message ids so repeated loads agree.

use crate::{
    checkpoint::{
        ChannelValues, ChannelVersions, Checkpoint, CheckpointMetadata, CheckpointSource,
    },
    error::{CheckpointError, Result},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Schema version of the legacy key-value layout
pub const LEGACY_VERSION: u64 = 1;

/// Channel version as written by the legacy layout
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ChannelVersion {
    Int(i64),
    Float(f64),
    String(String),
}

impl ChannelVersion {
    /// Collapse to a write counter. String versions of the form
    /// `"<counter>.<hash>"` keep their counter; anything else counts as one write.
    pub fn as_counter(&self) -> u64 {
        match self {
            ChannelVersion::Int(v) => (*v).max(0) as u64,
            ChannelVersion::Float(v) => v.max(0.0).floor() as u64,
            ChannelVersion::String(s) => s
                .split('.')
                .next()
                .and_then(|prefix| prefix.parse::<u64>().ok())
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyCheckpoint {
    thread_ts: String,
    #[serde(default)]
    parent_ts: Option<String>,
    #[serde(default)]
    ts: Option<DateTime<Utc>>,
    #[serde(default)]
    channel_values: HashMap<String, Value>,
    #[serde(default)]
    channel_versions: HashMap<String, ChannelVersion>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Schema version tag of a stored checkpoint. Untagged payloads are legacy.
pub fn schema_version(value: &Value) -> Result<u64> {
    match value.get("v") {
        None | Some(Value::Null) => Ok(LEGACY_VERSION),
        Some(v) => v.as_u64().ok_or_else(|| {
            CheckpointError::Invalid(format!("schema version must be an integer, got {}", v))
        }),
    }
}

/// Decode a stored checkpoint of any supported version into the current layout.
pub fn upgrade(value: Value, thread_id: &str) -> Result<Checkpoint> {
    match schema_version(&value)? {
        Checkpoint::CURRENT_VERSION => Ok(serde_json::from_value(value)?),
        LEGACY_VERSION => upgrade_legacy(value, thread_id),
        other => Err(CheckpointError::UnsupportedVersion(other)),
    }
}

fn upgrade_legacy(value: Value, thread_id: &str) -> Result<Checkpoint> {
    let legacy: LegacyCheckpoint = serde_json::from_value(value)?;

    let mut channel_values: ChannelValues = legacy.channel_values.into_iter().collect();
    if let Some(Value::Array(messages)) = channel_values.get_mut("messages") {
        assign_message_ids(&legacy.thread_ts, messages);
    }

    let channel_versions: ChannelVersions = legacy
        .channel_versions
        .iter()
        .map(|(channel, version)| (channel.clone(), version.as_counter()))
        .collect();

    let metadata = legacy_metadata(legacy.metadata, &channel_values)?;
    let ts = legacy.ts.unwrap_or_else(|| legacy_timestamp(&legacy.thread_ts));

    tracing::debug!(
        thread_id = %thread_id,
        checkpoint_id = %legacy.thread_ts,
        "Upgraded legacy checkpoint"
    );

    Ok(Checkpoint {
        v: Checkpoint::CURRENT_VERSION,
        id: legacy.thread_ts,
        thread_id: thread_id.to_string(),
        parent_id: legacy.parent_ts,
        ts,
        channel_values,
        channel_versions,
        metadata,
    })
}

/// Legacy ids are RFC 3339 timestamps. Anything else maps to the epoch so
/// repeated loads agree.
fn legacy_timestamp(thread_ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(thread_ts)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_default()
}

fn assign_message_ids(checkpoint_id: &str, messages: &mut [Value]) {
    for (index, message) in messages.iter_mut().enumerate() {
        if let Value::Object(fields) = message {
            let missing = fields.get("id").map_or(true, Value::is_null);
            if missing {
                fields.insert(
                    "id".to_string(),
                    Value::String(format!("{}-{}", checkpoint_id, index)),
                );
            }
        }
    }
}

fn legacy_metadata(
    mut fields: Map<String, Value>,
    channel_values: &ChannelValues,
) -> Result<CheckpointMetadata> {
    let source = match fields.remove("source") {
        Some(source) => serde_json::from_value(source)?,
        None => CheckpointSource::Loop,
    };
    let step = fields.remove("step").and_then(|s| s.as_i64()).unwrap_or(-1);
    // Legacy rows did not persist pending nodes; the only resumable shape is a
    // trailing ai message whose calls were never answered.
    fields.remove("writes");
    let next = if ends_with_pending_calls(channel_values) {
        vec!["action".to_string()]
    } else {
        Vec::new()
    };

    let mut metadata = CheckpointMetadata::new(source, step).with_next(next);
    metadata.extra = fields.into_iter().collect();
    Ok(metadata)
}

fn ends_with_pending_calls(channel_values: &ChannelValues) -> bool {
    channel_values
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| messages.last())
        .and_then(|last| last.get("tool_calls"))
        .and_then(Value::as_array)
        .is_some_and(|calls| !calls.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_row() -> Value {
        json!({
            "thread_ts": "2023-11-02T10:00:00.000001+00:00",
            "parent_ts": "2023-11-02T09:59:59.000001+00:00",
            "channel_values": {
                "messages": [
                    {"type": "human", "content": "weather?"},
                    {"type": "ai", "content": "", "tool_calls": [
                        {"id": "c1", "name": "search", "args": {"q": "weather"}}
                    ]}
                ]
            },
            "channel_versions": {"messages": "00000003.0.4021", "examples": 2.0},
            "metadata": {"source": "loop", "step": 4, "writes": {"agent": null}, "user": "u1"}
        })
    }

    #[test]
    fn test_current_version_passes_through() {
        let checkpoint = Checkpoint::root("t").with_channel("messages", json!([]));
        let value = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(upgrade(value, "t").unwrap(), checkpoint);
    }

    #[test]
    fn test_legacy_layout_is_upgraded() {
        let checkpoint = upgrade(legacy_row(), "thread-7").unwrap();

        assert_eq!(checkpoint.v, Checkpoint::CURRENT_VERSION);
        assert_eq!(checkpoint.thread_id, "thread-7");
        assert_eq!(checkpoint.id, "2023-11-02T10:00:00.000001+00:00");
        assert_eq!(
            checkpoint.parent_id.as_deref(),
            Some("2023-11-02T09:59:59.000001+00:00")
        );
        assert_eq!(checkpoint.version_of("messages"), 3);
        assert_eq!(checkpoint.version_of("examples"), 2);
        assert_eq!(checkpoint.metadata.source, CheckpointSource::Loop);
        assert_eq!(checkpoint.metadata.step, 4);
        assert_eq!(checkpoint.metadata.next, vec!["action".to_string()]);
        assert_eq!(checkpoint.metadata.extra.get("user"), Some(&json!("u1")));
        assert!(!checkpoint.metadata.extra.contains_key("writes"));

        let messages = checkpoint.channel_values["messages"].as_array().unwrap();
        assert_eq!(messages[0]["id"], "2023-11-02T10:00:00.000001+00:00-0");
        assert_eq!(messages[1]["id"], "2023-11-02T10:00:00.000001+00:00-1");
    }

    #[test]
    fn test_legacy_upgrade_is_deterministic() {
        let first = upgrade(legacy_row(), "t").unwrap();
        let second = upgrade(legacy_row(), "t").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.ts.to_rfc3339(), "2023-11-02T10:00:00.000001+00:00");
    }

    #[test]
    fn test_legacy_timestamp_fallbacks() {
        let mut row = legacy_row();
        row["ts"] = json!("2024-01-01T00:00:00Z");
        assert_eq!(upgrade(row, "t").unwrap().ts.to_rfc3339(), "2024-01-01T00:00:00+00:00");

        let mut row = legacy_row();
        row["thread_ts"] = json!("not-a-time");
        assert_eq!(upgrade(row, "t").unwrap().ts, DateTime::<Utc>::default());
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let err = upgrade(json!({"v": 9, "id": "x"}), "t").unwrap_err();
        assert!(matches!(err, CheckpointError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_channel_version_counters() {
        assert_eq!(ChannelVersion::Int(4).as_counter(), 4);
        assert_eq!(ChannelVersion::Float(2.7).as_counter(), 2);
        assert_eq!(ChannelVersion::String("00000012.0.55".into()).as_counter(), 12);
        assert_eq!(ChannelVersion::String("abc".into()).as_counter(), 1);
    }
}
