//! Event model
//!
//! An [`Event`] is what callers hand to the tracker; a [`TrackerEvent`] is
//! what the pipeline materializes from it at track time (identifier,
//! timestamps, state snapshot). Events come in exactly two forms:
//!
//! | Form | Use |
//! |------|-----|
//! | [`EventPayload::Structured`] | flat name + key/value events (clicks, timings) |
//! | [`EventPayload::SelfDescribing`] | schema'd events validated collector-side |
//!
//! Rendering matches on the form in exactly one place (the tracker), so new
//! event catalogs only ever construct one of these two variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::state::TrackerStateSnapshot;

/// A schema'd JSON document: schema identifier plus payload data.
///
/// Used both for self-describing event payloads and for context entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfDescribingJson {
    /// Schema identifier, e.g. `com.acme/screen/1-0-0`
    pub schema: String,
    /// Payload conforming to the schema
    pub data: Value,
}

impl SelfDescribingJson {
    pub fn new(schema: impl Into<String>, data: Value) -> Self {
        Self {
            schema: schema.into(),
            data,
        }
    }

    /// Wire form: `{"schema": ..., "data": ...}`
    pub fn as_value(&self) -> Value {
        json!({ "schema": self.schema, "data": self.data })
    }
}

/// The two payload forms an event can take.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Flat name + key/value event
    Structured {
        name: String,
        values: Map<String, Value>,
    },
    /// Schema'd event
    SelfDescribing(SelfDescribingJson),
}

impl EventPayload {
    /// Schema identifier for self-describing events, event name otherwise.
    ///
    /// This is the key state machines subscribe on.
    pub fn schema_or_name(&self) -> &str {
        match self {
            EventPayload::Structured { name, .. } => name,
            EventPayload::SelfDescribing(sdj) => &sdj.schema,
        }
    }
}

/// An event as supplied by the caller. Immutable once tracked.
#[derive(Debug, Clone)]
pub struct Event {
    /// Structured or self-describing payload
    pub payload: EventPayload,
    /// Caller-supplied timestamp override (device timestamp is always set
    /// by the pipeline)
    pub true_timestamp: Option<DateTime<Utc>>,
    /// Caller-supplied context entities
    pub entities: Vec<SelfDescribingJson>,
}

impl Event {
    /// A structured event with the given name and no values yet
    pub fn structured(name: impl Into<String>) -> Self {
        Self {
            payload: EventPayload::Structured {
                name: name.into(),
                values: Map::new(),
            },
            true_timestamp: None,
            entities: Vec::new(),
        }
    }

    /// A self-describing event
    pub fn self_describing(payload: SelfDescribingJson) -> Self {
        Self {
            payload: EventPayload::SelfDescribing(payload),
            true_timestamp: None,
            entities: Vec::new(),
        }
    }

    /// Add a key/value pair. No effect on self-describing events, whose
    /// payload is fixed by their schema.
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        if let EventPayload::Structured { values, .. } = &mut self.payload {
            values.insert(key.into(), value);
        }
        self
    }

    /// Attach a caller-supplied context entity
    pub fn with_entity(mut self, entity: SelfDescribingJson) -> Self {
        self.entities.push(entity);
        self
    }

    /// Override the true timestamp (e.g. for events replayed from a log)
    pub fn with_true_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.true_timestamp = Some(timestamp);
        self
    }

    /// Schema identifier or event name, see [`EventPayload::schema_or_name`]
    pub fn schema_or_name(&self) -> &str {
        self.payload.schema_or_name()
    }
}

/// An event materialized by the pipeline at track time.
///
/// The identifier, device timestamp, and state snapshot are assigned
/// synchronously under the tracker lock; the entity list keeps growing
/// during asynchronous rendering (machine entities, context generators) and
/// is sealed when the payload is handed to the emitter.
#[derive(Debug, Clone)]
pub struct TrackerEvent {
    /// Unique event identifier
    pub id: Uuid,
    /// When the tracker received the event
    pub device_timestamp: DateTime<Utc>,
    /// Caller-supplied timestamp override, if any
    pub true_timestamp: Option<DateTime<Utc>>,
    /// The event payload as supplied by the caller
    pub payload: EventPayload,
    /// Context entities; caller-supplied first, then machine- and
    /// generator-produced
    pub entities: Vec<SelfDescribingJson>,
    /// State of every registered machine as of this event
    pub snapshot: TrackerStateSnapshot,
}

impl TrackerEvent {
    pub fn new(
        event: &Event,
        id: Uuid,
        device_timestamp: DateTime<Utc>,
        snapshot: TrackerStateSnapshot,
    ) -> Self {
        Self {
            id,
            device_timestamp,
            true_timestamp: event.true_timestamp,
            payload: event.payload.clone(),
            entities: event.entities.clone(),
            snapshot,
        }
    }
}
