//! # signalpost
//!
//! Embedded event tracker: captures discrete application events, enriches
//! them with state-machine-derived context entities, and delivers them to a
//! remote collector through a durable, batching, retrying emitter.
//!
//! ## Architecture
//!
//! ```text
//! caller ── track ──► StateManager (synchronous, ordered)
//!                          │ snapshot
//!                          ▼
//!                 payload rendering (worker runtime)
//!                          │
//!                          ▼
//!      Emitter ──► EventStore (durable) ──► drain loop ──► Transport
//! ```
//!
//! Delivery is at-least-once: events leave the durable queue only after a
//! request outcome is known, so a crash between send and removal redelivers
//! on restart. The payload content hash gives collectors a deduplication
//! key for exactly that case.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use signalpost::{
//!     Config, Emitter, Event, HttpConnection, SqliteEventStore, Tracker, TrackerContext,
//! };
//!
//! # fn main() -> signalpost::Result<()> {
//! let config = Config::load()?;
//!
//! let context = TrackerContext::new(config.tracker.worker_threads)?;
//! let store = Arc::new(SqliteEventStore::open(
//!     &config.storage.resolve_database_path(&config.tracker.namespace),
//! )?);
//! let transport = Arc::new(HttpConnection::new(&config.network)?);
//! let emitter = Emitter::new(config.emitter.clone(), store, transport, context.handle());
//! let tracker = Tracker::new(config.tracker.clone(), emitter, &context);
//!
//! tracker.track(Event::structured("app_started"));
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::{
    Config, EmitterConfig, LoggingConfig, NetworkConfig, Platform, StorageConfig, TrackerConfig,
};
pub use emitter::{ConnectivityProbe, Emitter, ResultCallback};
pub use error::{Error, Result};
pub use event::{Event, EventPayload, SelfDescribingJson, TrackerEvent};
pub use network::{HttpConnection, HttpMethod, Request, RequestResult, Transport};
pub use payload::Payload;
pub use state::{State, StateMachine, StateManager, Subscription, TrackerStateSnapshot};
pub use store::{EventStore, InMemoryEventStore, QueuedEvent, SqliteEventStore};
pub use tracker::{ContextGenerator, Tracker, TrackerContext};

// Public modules
pub mod config;
pub mod emitter;
pub mod error;
pub mod event;
pub mod logging;
pub mod network;
pub mod payload;
pub mod state;
pub mod store;
pub mod tracker;
