//! State machine registry and per-event snapshots

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::event::{Event, SelfDescribingJson};

use super::{guarded, State, StateFuture, StateMachine, Subscription};

/// Per-concern index from event schema to interested machine identifiers.
#[derive(Debug, Default)]
struct SchemaIndex {
    by_schema: HashMap<String, Vec<String>>,
    wildcard: Vec<String>,
}

impl SchemaIndex {
    fn add(&mut self, identifier: &str, subscription: &Subscription) {
        match subscription {
            Subscription::All => self.wildcard.push(identifier.to_string()),
            Subscription::Schemas(schemas) => {
                for schema in schemas {
                    self.by_schema
                        .entry(schema.clone())
                        .or_default()
                        .push(identifier.to_string());
                }
            }
        }
    }

    fn remove(&mut self, identifier: &str) {
        self.wildcard.retain(|id| id != identifier);
        for ids in self.by_schema.values_mut() {
            ids.retain(|id| id != identifier);
        }
        self.by_schema.retain(|_, ids| !ids.is_empty());
    }

    fn interested(&self, identifier: &str, schema: &str) -> bool {
        self.wildcard.iter().any(|id| id == identifier)
            || self
                .by_schema
                .get(schema)
                .map_or(false, |ids| ids.iter().any(|id| id == identifier))
    }
}

/// Immutable point-in-time view of every machine's state as of one event.
///
/// Captured synchronously at track time; concurrent later events never leak
/// into it because each entry is a [`StateFuture`] chained strictly from
/// earlier events.
#[derive(Debug, Clone, Default)]
pub struct TrackerStateSnapshot {
    futures: HashMap<String, Arc<StateFuture>>,
}

impl TrackerStateSnapshot {
    fn new(futures: HashMap<String, Arc<StateFuture>>) -> Self {
        Self { futures }
    }

    /// The opaque state of a machine as of this snapshot's event
    pub fn state(&self, identifier: &str) -> Option<State> {
        self.futures.get(identifier).and_then(|f| f.resolve())
    }

    /// Typed accessor: resolve a machine's state and downcast it.
    ///
    /// This is how one consumer reads another machine's state, instead of
    /// fishing typed values out of the generated entity list.
    pub fn state_of<T: Any + Send + Sync>(&self, identifier: &str) -> Option<Arc<T>> {
        self.state(identifier).and_then(|s| s.downcast::<T>().ok())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.futures.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }
}

/// Registry of named state machines and their current future chains.
///
/// All mutating calls happen under the tracker's ordering lock; the manager
/// itself is plain data.
#[derive(Default)]
pub struct StateManager {
    machines: HashMap<String, Arc<dyn StateMachine>>,
    /// Registration order; drives entity and payload iteration order
    order: Vec<String>,
    transitions: SchemaIndex,
    entities: SchemaIndex,
    payloads: SchemaIndex,
    /// Current future per machine ("tracker state")
    futures: HashMap<String, Arc<StateFuture>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a machine under an identifier.
    ///
    /// No-ops when a machine of the identical concrete type is already
    /// registered under that identifier. Otherwise any prior registration
    /// is dropped (state and index entries included) before the new machine
    /// is indexed under its declared schemas for all three concerns.
    pub fn add_or_replace(&mut self, identifier: &str, machine: Arc<dyn StateMachine>) {
        if let Some(existing) = self.machines.get(identifier) {
            if existing.as_ref().type_id() == machine.as_ref().type_id() {
                return;
            }
            self.remove(identifier);
        }

        self.transitions
            .add(identifier, &machine.transition_subscription());
        self.entities.add(identifier, &machine.entity_subscription());
        self.payloads.add(identifier, &machine.payload_subscription());
        self.machines.insert(identifier.to_string(), machine);
        self.order.push(identifier.to_string());
    }

    /// Drop a machine, its current state, and its index entries.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, identifier: &str) -> bool {
        if self.machines.remove(identifier).is_none() {
            return false;
        }
        self.order.retain(|id| id != identifier);
        self.transitions.remove(identifier);
        self.entities.remove(identifier);
        self.payloads.remove(identifier);
        self.futures.remove(identifier);
        true
    }

    /// Advance state for a newly tracked event.
    ///
    /// For every machine subscribed to this event's schema for the
    /// transition concern, chains a new future onto the machine's previous
    /// one and force-evaluates it immediately. Eager evaluation trades a
    /// little latency inside the ordering lock for a pending chain that
    /// never grows beyond one hop, which keeps memory bounded when
    /// snapshots are resolved late or not at all.
    pub fn advance(&mut self, event: &Arc<Event>) -> TrackerStateSnapshot {
        let schema = event.schema_or_name().to_string();

        for identifier in &self.order {
            if !self.transitions.interested(identifier, &schema) {
                continue;
            }
            let machine = self.machines[identifier].clone();
            let previous = self.futures.get(identifier).cloned();
            let future = Arc::new(StateFuture::new(
                identifier.clone(),
                machine,
                Arc::clone(event),
                previous,
            ));
            future.resolve();
            self.futures.insert(identifier.clone(), future);
        }

        TrackerStateSnapshot::new(self.futures.clone())
    }

    /// Context entities for an event, given its snapshot.
    ///
    /// Concatenated in machine-registration order; machines producing
    /// nothing are skipped.
    pub fn entities_for(
        &self,
        event: &Event,
        snapshot: &TrackerStateSnapshot,
    ) -> Vec<SelfDescribingJson> {
        let schema = event.schema_or_name();
        let mut out = Vec::new();

        for identifier in &self.order {
            if !self.entities.interested(identifier, schema) {
                continue;
            }
            let machine = &self.machines[identifier];
            let state = snapshot.state(identifier);
            let produced = guarded(identifier, "entities", || {
                machine.entities(event, state.as_ref())
            })
            .flatten();
            if let Some(entities) = produced {
                out.extend(entities);
            }
        }

        out
    }

    /// Merge machine payload fields into a rendered payload, given the
    /// event's snapshot. Only keys the payload does not already carry are
    /// written; a collision is logged and reported as failure, but the
    /// remaining machines still run.
    pub fn payload_additions_for(
        &self,
        event: &Event,
        snapshot: &TrackerStateSnapshot,
        payload: &mut Map<String, Value>,
    ) -> bool {
        let schema = event.schema_or_name();
        let mut ok = true;

        for identifier in &self.order {
            if !self.payloads.interested(identifier, schema) {
                continue;
            }
            let machine = &self.machines[identifier];
            let state = snapshot.state(identifier);
            let produced = guarded(identifier, "payload_values", || {
                machine.payload_values(event, state.as_ref())
            })
            .flatten();
            let Some(values) = produced else {
                continue;
            };
            for (key, value) in values {
                if payload.contains_key(&key) {
                    tracing::warn!(
                        machine = identifier.as_str(),
                        key = key.as_str(),
                        "payload addition collides with existing field; keeping original"
                    );
                    ok = false;
                    continue;
                }
                payload.insert(key, value);
            }
        }

        ok
    }

    /// Number of registered machines
    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }
}
