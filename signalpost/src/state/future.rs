//! Lazy, memoized state computation nodes
//!
//! Each tracked event chains one [`StateFuture`] per interested machine
//! onto that machine's previous future. Resolution applies the machine's
//! `transition` exactly once, then drops the references to the previous
//! future and the triggering event so the chain behind it can be freed.
//! Snapshots can therefore be resolved in any order without observing
//! events tracked after them.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::event::Event;

use super::{guarded, State, StateMachine};

/// A memoized computation of one machine's state after one event.
pub struct StateFuture {
    cell: Mutex<FutureCell>,
}

enum FutureCell {
    Pending {
        identifier: String,
        machine: Arc<dyn StateMachine>,
        event: Arc<Event>,
        previous: Option<Arc<StateFuture>>,
    },
    Resolved(Option<State>),
}

impl StateFuture {
    pub(crate) fn new(
        identifier: String,
        machine: Arc<dyn StateMachine>,
        event: Arc<Event>,
        previous: Option<Arc<StateFuture>>,
    ) -> Self {
        Self {
            cell: Mutex::new(FutureCell::Pending {
                identifier,
                machine,
                event,
                previous,
            }),
        }
    }

    /// Seed future carrying an already-computed state
    #[cfg(test)]
    pub(crate) fn resolved(state: Option<State>) -> Self {
        Self {
            cell: Mutex::new(FutureCell::Resolved(state)),
        }
    }

    /// Resolve to this future's state. Idempotent: the transition runs on
    /// the first call only, later calls return the memoized value.
    ///
    /// The previous future is resolved first (also memoized, so the
    /// recursion is O(1) amortized per node). Lock order follows the chain
    /// strictly backwards in track order, so no cycle is possible.
    pub fn resolve(&self) -> Option<State> {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());

        if let FutureCell::Resolved(state) = &*cell {
            return state.clone();
        }

        // Take ownership of the pending parts; references to the event and
        // the previous future die here, letting the chain be freed.
        let pending = std::mem::replace(&mut *cell, FutureCell::Resolved(None));
        let FutureCell::Pending {
            identifier,
            machine,
            event,
            previous,
        } = pending
        else {
            unreachable!("checked resolved above");
        };

        let previous_state = previous.as_ref().and_then(|f| f.resolve());
        let state = guarded(&identifier, "transition", || {
            machine.transition(&event, previous_state.as_ref())
        })
        .flatten();

        *cell = FutureCell::Resolved(state.clone());
        state
    }

    /// Whether `resolve` has already run
    pub fn is_resolved(&self) -> bool {
        matches!(
            &*self.cell.lock().unwrap_or_else(|e| e.into_inner()),
            FutureCell::Resolved(_)
        )
    }
}

impl fmt::Debug for StateFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateFuture")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
