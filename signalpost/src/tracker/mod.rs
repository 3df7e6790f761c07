//! Event pipeline
//!
//! `track` is the single entry point for callers. Its synchronous section
//! (identifier and timestamp assignment plus state advancement) runs under
//! one lock so events chain in true call order. Everything after that, from
//! payload rendering and entity collection to emission, happens on the
//! worker runtime and never blocks or fails the caller.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::runtime::{Builder, Handle, Runtime};
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::emitter::Emitter;
use crate::error::{Error, Result};
use crate::event::{Event, EventPayload, SelfDescribingJson, TrackerEvent};
use crate::payload::{content_hash, protocol, Payload};
use crate::state::{guarded, StateMachine, StateManager, TrackerStateSnapshot};

/// Version tag stamped onto every payload
pub const TRACKER_VERSION: &str = concat!("signalpost-", env!("CARGO_PKG_VERSION"));

/// Supplies context entities from outside the state machine registry
/// (device metadata, experiment assignments, anything event-independent).
pub trait ContextGenerator: Send + Sync {
    fn entities(&self, event: &Event) -> Vec<SelfDescribingJson>;
}

/// Owns the worker runtime shared by rendering and delivery.
///
/// Constructed explicitly and handed to [`Tracker`] and
/// [`Emitter`](crate::Emitter) at construction; its lifecycle is scoped to
/// this value, not the process.
pub struct TrackerContext {
    runtime: Runtime,
}

impl TrackerContext {
    /// Build a worker runtime. A minimum of two threads is enforced so
    /// rendering can never starve the drain loop.
    pub fn new(worker_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(2))
            .thread_name("signalpost-worker")
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to create worker runtime: {}", e)))?;
        Ok(Self { runtime })
    }

    /// Handle for spawning work onto this context
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Release the runtime without waiting for in-flight work
    pub fn shutdown(self) {
        self.runtime.shutdown_background();
    }
}

/// The event pipeline: capture, enrich, hand off to the emitter
#[derive(Clone)]
pub struct Tracker {
    shared: Arc<TrackerShared>,
}

struct TrackerShared {
    config: TrackerConfig,
    /// The single serialization point: id/timestamp assignment and state
    /// advancement happen under this lock, nothing else does
    state: Mutex<StateManager>,
    generators: RwLock<Vec<(String, Arc<dyn ContextGenerator>)>>,
    emitter: Emitter,
    handle: Handle,
}

impl Tracker {
    pub fn new(config: TrackerConfig, emitter: Emitter, context: &TrackerContext) -> Self {
        Self {
            shared: Arc::new(TrackerShared {
                config,
                state: Mutex::new(StateManager::new()),
                generators: RwLock::new(Vec::new()),
                emitter,
                handle: context.handle(),
            }),
        }
    }

    /// Track one event, returning its assigned identifier.
    ///
    /// Safe to call from any thread; concurrent callers are ordered by the
    /// internal lock and their snapshots chain accordingly. Delivery
    /// outcome is only observable through the emitter's result callback.
    pub fn track(&self, event: Event) -> Uuid {
        let event = Arc::new(event);

        let (id, device_timestamp, snapshot) = {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            let id = Uuid::new_v4();
            let device_timestamp = Utc::now();
            let snapshot = state.advance(&event);
            (id, device_timestamp, snapshot)
        };

        let shared = Arc::clone(&self.shared);
        self.shared.handle.spawn(async move {
            shared.render_and_submit(event, id, device_timestamp, snapshot);
        });

        id
    }

    /// Register a state machine under an identifier; see
    /// [`StateManager::add_or_replace`] for replacement semantics.
    pub fn add_state_machine(&self, identifier: &str, machine: Arc<dyn StateMachine>) {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add_or_replace(identifier, machine);
    }

    /// Drop a state machine and its accumulated state
    pub fn remove_state_machine(&self, identifier: &str) -> bool {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(identifier)
    }

    /// Register a context generator; an existing one under the same name
    /// is replaced.
    pub fn add_context_generator(&self, name: &str, generator: Arc<dyn ContextGenerator>) {
        let mut generators = self.shared.generators.write().unwrap();
        generators.retain(|(n, _)| n != name);
        generators.push((name.to_string(), generator));
    }

    pub fn remove_context_generator(&self, name: &str) -> bool {
        let mut generators = self.shared.generators.write().unwrap();
        let before = generators.len();
        generators.retain(|(n, _)| n != name);
        generators.len() != before
    }

    /// The emitter delivering this tracker's events
    pub fn emitter(&self) -> &Emitter {
        &self.shared.emitter
    }

    /// Nudge the emitter's drain loop
    pub fn flush(&self) {
        self.shared.emitter.flush();
    }

    /// Stop delivery; queued events stay durable for the next instance
    pub fn shutdown(&self) {
        self.shared.emitter.shutdown();
    }
}

impl TrackerShared {
    fn render_and_submit(
        &self,
        event: Arc<Event>,
        id: Uuid,
        device_timestamp: DateTime<Utc>,
        snapshot: TrackerStateSnapshot,
    ) {
        let mut tracked = TrackerEvent::new(&event, id, device_timestamp, snapshot);

        // Machine entities first, then generator entities; the caller's own
        // entities are already in place. This seals the entity list.
        {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            tracked
                .entities
                .extend(state.entities_for(&event, &tracked.snapshot));
        }
        for (name, generator) in self.generators.read().unwrap().iter() {
            let produced = guarded(name, "entities", || generator.entities(&event));
            if let Some(entities) = produced {
                tracked.entities.extend(entities);
            }
        }

        let payload = self.render(&tracked, &event);
        self.emitter.add(payload);
    }

    fn render(&self, tracked: &TrackerEvent, event: &Event) -> Payload {
        let mut payload = Payload::new();

        payload.add(protocol::PLATFORM, self.config.platform.as_str());
        payload.add(protocol::TRACKER_VERSION, TRACKER_VERSION);
        payload.add(protocol::NAMESPACE, self.config.namespace.clone());
        payload.add(protocol::APP_ID, self.config.app_id.clone());
        payload.add(protocol::EVENT_ID, tracked.id.to_string());
        payload.add(
            protocol::DEVICE_TIMESTAMP,
            tracked.device_timestamp.timestamp_millis().to_string(),
        );
        if let Some(true_timestamp) = tracked.true_timestamp {
            payload.add(
                protocol::TRUE_TIMESTAMP,
                true_timestamp.timestamp_millis().to_string(),
            );
        }

        // The single spot where the two payload forms diverge
        match &tracked.payload {
            EventPayload::Structured { name, values } => {
                payload.add(protocol::EVENT, name.clone());
                for (key, value) in values {
                    if !payload.contains_key(key) {
                        payload.add_json(key, value.clone());
                    }
                }
            }
            EventPayload::SelfDescribing(sdj) => {
                payload.add(protocol::EVENT, protocol::SELF_DESCRIBING_EVENT);
                let wrapped = SelfDescribingJson::new(
                    protocol::SELF_DESCRIBING_EVENT_SCHEMA,
                    sdj.as_value(),
                );
                payload.add_json(protocol::SELF_DESCRIBING_PAYLOAD, wrapped.as_value());
            }
        }

        {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.payload_additions_for(event, &tracked.snapshot, payload.values_mut()) {
                tracing::warn!(
                    event = %tracked.id,
                    "payload additions collided with existing fields"
                );
            }
        }

        if !tracked.entities.is_empty() {
            let data: Vec<Value> = tracked
                .entities
                .iter()
                .map(SelfDescribingJson::as_value)
                .collect();
            let contexts =
                SelfDescribingJson::new(protocol::CONTEXT_ENTITIES_SCHEMA, Value::Array(data));
            payload.add_json(protocol::CONTEXT, contexts.as_value());
        }

        let hash = content_hash(&payload);
        payload.add(protocol::EVENT_HASH, hash);

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shared_for_render() -> (TrackerShared, TrackerContext) {
        let context = TrackerContext::new(2).unwrap();
        let emitter = Emitter::new(
            crate::config::EmitterConfig::default(),
            Arc::new(crate::store::InMemoryEventStore::new()),
            Arc::new(NullTransport),
            context.handle(),
        );
        let shared = TrackerShared {
            config: TrackerConfig {
                namespace: "test".to_string(),
                app_id: "unit".to_string(),
                ..Default::default()
            },
            state: Mutex::new(StateManager::new()),
            generators: RwLock::new(Vec::new()),
            emitter,
            handle: context.handle(),
        };
        (shared, context)
    }

    struct NullTransport;

    #[async_trait::async_trait]
    impl crate::network::Transport for NullTransport {
        async fn send(
            &self,
            requests: Vec<crate::network::Request>,
        ) -> Vec<crate::network::RequestResult> {
            requests
                .iter()
                .map(|r| crate::network::RequestResult::new(Some(200), r))
                .collect()
        }
        fn http_method(&self) -> crate::network::HttpMethod {
            crate::network::HttpMethod::Post
        }
        fn endpoint_uri(&self) -> String {
            String::new()
        }
    }

    fn rendered(shared: &TrackerShared, event: Event) -> Payload {
        let event = Arc::new(event);
        let snapshot = shared
            .state
            .lock()
            .unwrap()
            .advance(&event);
        let tracked = TrackerEvent::new(&event, Uuid::new_v4(), Utc::now(), snapshot);
        shared.render(&tracked, &event)
    }

    #[test]
    fn test_render_structured_event() {
        let (shared, _context) = shared_for_render();
        let payload = rendered(
            &shared,
            Event::structured("button_click").with_value("button_id", json!("buy")),
        );

        assert_eq!(payload.get(protocol::EVENT).unwrap(), "button_click");
        assert_eq!(payload.get("button_id").unwrap(), "buy");
        assert_eq!(payload.get(protocol::NAMESPACE).unwrap(), "test");
        assert_eq!(payload.get(protocol::APP_ID).unwrap(), "unit");
        assert!(payload.get(protocol::EVENT_ID).is_some());
        assert!(payload.get(protocol::DEVICE_TIMESTAMP).is_some());
        assert!(payload.get(protocol::EVENT_HASH).is_some());
        assert!(payload.get(protocol::TRUE_TIMESTAMP).is_none());
    }

    #[test]
    fn test_render_self_describing_event() {
        let (shared, _context) = shared_for_render();
        let payload = rendered(
            &shared,
            Event::self_describing(SelfDescribingJson::new(
                "com.acme/checkout/1-0-0",
                json!({"total": 42}),
            )),
        );

        assert_eq!(
            payload.get(protocol::EVENT).unwrap(),
            protocol::SELF_DESCRIBING_EVENT
        );
        let wrapped = payload.get(protocol::SELF_DESCRIBING_PAYLOAD).unwrap();
        assert_eq!(wrapped["schema"], protocol::SELF_DESCRIBING_EVENT_SCHEMA);
        assert_eq!(wrapped["data"]["schema"], "com.acme/checkout/1-0-0");
        assert_eq!(wrapped["data"]["data"]["total"], 42);
    }

    #[test]
    fn test_render_wraps_caller_entities() {
        let (shared, _context) = shared_for_render();
        let payload = rendered(
            &shared,
            Event::structured("ping").with_entity(SelfDescribingJson::new(
                "com.acme/user/1-0-0",
                json!({"id": 7}),
            )),
        );

        let contexts = payload.get(protocol::CONTEXT).unwrap();
        assert_eq!(contexts["schema"], protocol::CONTEXT_ENTITIES_SCHEMA);
        let data = contexts["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["schema"], "com.acme/user/1-0-0");
    }

    #[test]
    fn test_render_true_timestamp() {
        let (shared, _context) = shared_for_render();
        let ts = Utc::now();
        let payload = rendered(
            &shared,
            Event::structured("ping").with_true_timestamp(ts),
        );

        assert_eq!(
            payload.get(protocol::TRUE_TIMESTAMP).unwrap(),
            &json!(ts.timestamp_millis().to_string())
        );
    }

    #[test]
    fn test_structured_values_cannot_clobber_base_fields() {
        let (shared, _context) = shared_for_render();
        let payload = rendered(
            &shared,
            Event::structured("ping").with_value(protocol::EVENT, json!("spoofed")),
        );

        assert_eq!(payload.get(protocol::EVENT).unwrap(), "ping");
    }
}
