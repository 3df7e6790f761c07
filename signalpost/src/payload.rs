//! Wire payload representation
//!
//! A [`Payload`] is the flat key/value map an event is rendered into before
//! it is queued. The field vocabulary and envelope schemas live in
//! [`protocol`]; the emitter and transport only ever see payloads, never the
//! richer event model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Field names and schema identifiers used on the wire.
pub mod protocol {
    /// Event name (structured) or the self-describing marker
    pub const EVENT: &str = "e";
    /// Unique event identifier
    pub const EVENT_ID: &str = "eid";
    /// Device timestamp, epoch millis
    pub const DEVICE_TIMESTAMP: &str = "dtm";
    /// Caller-supplied true timestamp, epoch millis
    pub const TRUE_TIMESTAMP: &str = "ttm";
    /// Send timestamp, epoch millis; stamped when a request is built
    pub const SENT_TIMESTAMP: &str = "stm";
    /// Platform tag
    pub const PLATFORM: &str = "p";
    /// Tracker namespace
    pub const NAMESPACE: &str = "tna";
    /// Application identifier
    pub const APP_ID: &str = "aid";
    /// Tracker name and version
    pub const TRACKER_VERSION: &str = "tv";
    /// Content hash for collector-side deduplication
    pub const EVENT_HASH: &str = "eh";
    /// Context entities envelope
    pub const CONTEXT: &str = "co";
    /// Self-describing event payload envelope
    pub const SELF_DESCRIBING_PAYLOAD: &str = "sd_pr";
    /// Value of [`EVENT`] for self-describing events
    pub const SELF_DESCRIBING_EVENT: &str = "sd";

    /// Envelope schema wrapping a POST batch of payloads
    pub const PAYLOAD_DATA_SCHEMA: &str = "dev.signalpost/payload_data/1-0-0";
    /// Envelope schema wrapping an event's context entities
    pub const CONTEXT_ENTITIES_SCHEMA: &str = "dev.signalpost/context_entities/1-0-0";
    /// Envelope schema wrapping a self-describing event payload
    pub const SELF_DESCRIBING_EVENT_SCHEMA: &str = "dev.signalpost/self_describing_event/1-0-0";
}

/// A rendered event: flat map of wire fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    values: Map<String, Value>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string field. Empty values are skipped so optional identity
    /// fields (e.g. an unset app id) never reach the wire.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.values.insert(key.to_string(), Value::String(value));
    }

    /// Add a structured field
    pub fn add_json(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialized size in bytes, as it would go over the wire
    pub fn byte_size(&self) -> usize {
        serde_json::to_string(&self.values)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Consume into a JSON object value
    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }

    /// Clone into a JSON object value
    pub fn as_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

/// Compute a content-based hash for collector-side deduplication
///
/// Delivery is at-least-once: a crash between a successful send and queue
/// removal redelivers the event on restart. The hash gives the collector a
/// stable key to drop such duplicates. Returns a 32-character hex digest
/// (first 16 bytes of SHA-256 over the serialized payload).
pub fn content_hash(payload: &Payload) -> String {
    let content = serde_json::to_string(payload.values()).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();

    hex::encode(&result[..16])
}
