//! In-memory event store
//!
//! Same contract as the SQLite store minus durability. Used by tests and
//! by hosts that prefer losing queued events on exit over touching disk.

use std::sync::Mutex;

use crate::error::Result;
use crate::payload::Payload;

use super::{EventStore, QueuedEvent};

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    events: Vec<QueuedEvent>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn add(&self, payload: &Payload) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.events.push(QueuedEvent {
            id,
            payload: payload.clone(),
        });
        Ok(id)
    }

    fn next_batch(&self, limit: usize) -> Result<Vec<QueuedEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.events.iter().take(limit).cloned().collect())
    }

    fn remove(&self, ids: &[i64]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.events.len();
        inner.events.retain(|event| !ids.contains(&event.id));
        Ok(before - inner.events.len())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.inner.lock().unwrap().events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(marker: &str) -> Payload {
        let mut p = Payload::new();
        p.add("e", marker);
        p
    }

    #[test]
    fn test_fifo_order_and_removal() {
        let store = InMemoryEventStore::new();
        let a = store.add(&payload("a")).unwrap();
        let b = store.add(&payload("b")).unwrap();
        let c = store.add(&payload("c")).unwrap();
        assert!(a < b && b < c);

        let batch = store.next_batch(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, a);
        assert_eq!(batch[1].id, b);

        assert_eq!(store.remove(&[a, c]).unwrap(), 2);
        assert_eq!(store.size().unwrap(), 1);
        assert_eq!(store.next_batch(10).unwrap()[0].id, b);
    }
}
