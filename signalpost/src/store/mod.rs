//! Durable event queue
//!
//! Rendered payloads land here before delivery; the emitter drains the
//! queue and removes events only once their request outcome is known, so a
//! crash between a successful send and removal redelivers on restart
//! (at-least-once, never exactly-once).
//!
//! [`SqliteEventStore`] is the default durable implementation;
//! [`InMemoryEventStore`] serves tests and hosts that accept losing queued
//! events on process exit.

mod memory;
mod sqlite;

pub use memory::InMemoryEventStore;
pub use sqlite::SqliteEventStore;

use crate::error::Result;
use crate::payload::Payload;

/// A queued payload with its durable id.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    /// Monotonic queue id; also the insertion order
    pub id: i64,
    /// The rendered wire payload
    pub payload: Payload,
}

/// Durable FIFO queue the emitter drains.
///
/// `next_batch` must return events oldest-first and must not hand out
/// duplicates across the sequential calls made by the single drain loop.
/// Implementations own their records; the emitter only ever holds copies.
pub trait EventStore: Send + Sync {
    /// Append a payload. Returns the assigned id.
    fn add(&self, payload: &Payload) -> Result<i64>;

    /// Up to `limit` oldest events, insertion-ordered
    fn next_batch(&self, limit: usize) -> Result<Vec<QueuedEvent>>;

    /// Delete the given ids. Returns how many were removed.
    fn remove(&self, ids: &[i64]) -> Result<usize>;

    /// Number of queued events
    fn size(&self) -> Result<usize>;
}
