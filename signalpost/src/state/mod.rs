//! State machine registry
//!
//! State machines compute contextual concerns (current screen, session,
//! deep link) from the ordered event stream. Each machine is pure logic:
//! it declares which event schemas it reacts to, folds events into an
//! opaque [`State`] via `transition`, and derives outputs from that state
//! via `entities` and `payload_values`.
//!
//! ## Architecture
//!
//! ```text
//! track(event) ──► StateManager.advance ──► StateFuture chain (per machine)
//!                        │                        │ resolve (memoized)
//!                        ▼                        ▼
//!               TrackerStateSnapshot ──────► State values
//!                        │
//!        entities_for / payload_additions_for (during rendering)
//! ```
//!
//! Machines are external code: every call into one is isolated so a
//! panicking machine is logged and skipped, never letting one faulty
//! machine break the pipeline for the others.

mod future;
mod manager;

pub use future::StateFuture;
pub use manager::{StateManager, TrackerStateSnapshot};

use std::any::Any;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::event::{Event, SelfDescribingJson};

/// Opaque, immutable state value produced by one machine for one concern.
///
/// Downcast back to the concrete type with
/// [`TrackerStateSnapshot::state_of`].
pub type State = Arc<dyn Any + Send + Sync>;

/// Event schemas a machine wants to see for one concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    /// Match every schema
    All,
    /// Match exactly these schemas or event names; empty matches nothing
    Schemas(Vec<String>),
}

impl Subscription {
    /// A subscription that matches nothing
    pub fn none() -> Self {
        Subscription::Schemas(Vec::new())
    }

    pub fn matches(&self, schema: &str) -> bool {
        match self {
            Subscription::All => true,
            Subscription::Schemas(schemas) => schemas.iter().any(|s| s == schema),
        }
    }
}

/// Pure transition/read logic computing one contextual concern from the
/// event stream.
///
/// Implementations must be cheap and side-effect free: `transition` runs
/// under the tracker's ordering lock. The `Any` supertrait lets the
/// registry detect re-registration of the same machine type.
pub trait StateMachine: Any + Send + Sync {
    /// Schemas whose events drive [`transition`](Self::transition)
    fn transition_subscription(&self) -> Subscription;

    /// Schemas whose events drive [`entities`](Self::entities)
    fn entity_subscription(&self) -> Subscription {
        Subscription::none()
    }

    /// Schemas whose events drive [`payload_values`](Self::payload_values)
    fn payload_subscription(&self) -> Subscription {
        Subscription::none()
    }

    /// Fold an event into the machine's state. Returning `None` clears the
    /// state as of this event.
    fn transition(&self, event: &Event, previous: Option<&State>) -> Option<State>;

    /// Context entities derived from the state as of this event
    fn entities(&self, event: &Event, state: Option<&State>) -> Option<Vec<SelfDescribingJson>> {
        let _ = (event, state);
        None
    }

    /// Payload fields derived from the state as of this event. Fields only
    /// land on keys the payload does not already carry.
    fn payload_values(&self, event: &Event, state: Option<&State>) -> Option<Map<String, Value>> {
        let _ = (event, state);
        None
    }
}

/// Run a machine callback, isolating panics.
///
/// Machines are host-application code; a panic in one must not poison the
/// tracker lock or take down the worker. Returns `None` when the callback
/// panicked.
pub(crate) fn guarded<T>(identifier: &str, call: &str, f: impl FnOnce() -> T) -> Option<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::warn!(
                machine = identifier,
                call,
                panic = %message,
                "state machine panicked; skipping"
            );
            None
        }
    }
}
