//! Request building
//!
//! Partitions one drain cycle's queued events into wire requests. GET gets
//! one request per event; POST packs greedily into groups bounded by both
//! the buffer group size and the byte budget. A payload that cannot fit a
//! request even alone ships as a single oversize request, which the result
//! handling drops after its first attempt.

use chrono::Utc;
use serde_json::{json, Value};

use crate::config::EmitterConfig;
use crate::network::{HttpMethod, Request};
use crate::payload::protocol;
use crate::store::QueuedEvent;

/// Fixed JSON envelope overhead counted against the POST byte budget
pub(crate) const POST_ENVELOPE_BYTES: usize = 88;
/// Wire overhead for a GET request beyond the payload itself
pub(crate) const GET_OVERHEAD_BYTES: usize = 22;

/// Build the cycle's requests from an ordered batch of queued events
pub(crate) fn build_requests(
    events: &[QueuedEvent],
    method: HttpMethod,
    config: &EmitterConfig,
) -> Vec<Request> {
    match method {
        HttpMethod::Get => build_get_requests(events, config.byte_limit_get),
        HttpMethod::Post => {
            build_post_requests(events, config.byte_limit_post, config.buffer_group_size.max(1))
        }
    }
}

/// Stamp the send time and return the wire value plus its serialized size
fn stamped(event: &QueuedEvent) -> (Value, usize) {
    let mut payload = event.payload.clone();
    payload.add(
        protocol::SENT_TIMESTAMP,
        Utc::now().timestamp_millis().to_string(),
    );
    let size = payload.byte_size();
    (payload.into_value(), size)
}

/// Wrap a group of payloads in the POST batch envelope
fn envelope(data: Vec<Value>) -> Value {
    json!({
        "schema": protocol::PAYLOAD_DATA_SCHEMA,
        "data": data,
    })
}

fn build_get_requests(events: &[QueuedEvent], byte_limit: usize) -> Vec<Request> {
    events
        .iter()
        .map(|event| {
            let (payload, size) = stamped(event);
            if size + GET_OVERHEAD_BYTES > byte_limit {
                Request::oversize(payload, event.id)
            } else {
                Request::new(payload, vec![event.id])
            }
        })
        .collect()
}

fn build_post_requests(
    events: &[QueuedEvent],
    byte_limit: usize,
    group_size: usize,
) -> Vec<Request> {
    let mut requests = Vec::new();
    let mut group: Vec<Value> = Vec::new();
    let mut group_ids: Vec<i64> = Vec::new();
    let mut group_bytes = 0usize;

    for event in events {
        let (payload, size) = stamped(event);

        if size + POST_ENVELOPE_BYTES > byte_limit {
            // Can never fit; ship alone so the rest of the batch still goes out
            requests.push(Request::oversize(envelope(vec![payload]), event.id));
            continue;
        }

        // Seal the running group when this payload would push it over budget
        // (group.len() accounts for the separators between array elements)
        let projected = group_bytes + size + POST_ENVELOPE_BYTES + group.len();
        if !group.is_empty() && projected > byte_limit {
            requests.push(Request::new(
                envelope(std::mem::take(&mut group)),
                std::mem::take(&mut group_ids),
            ));
            group_bytes = 0;
        }

        group_bytes += size;
        group.push(payload);
        group_ids.push(event.id);

        if group.len() >= group_size {
            requests.push(Request::new(
                envelope(std::mem::take(&mut group)),
                std::mem::take(&mut group_ids),
            ));
            group_bytes = 0;
        }
    }

    if !group.is_empty() {
        requests.push(Request::new(envelope(group), group_ids));
    }

    requests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    fn queued(id: i64, filler: usize) -> QueuedEvent {
        let mut payload = Payload::new();
        payload.add("e", "ping");
        payload.add("eid", format!("{:038}", id));
        if filler > 0 {
            payload.add("filler", "x".repeat(filler));
        }
        QueuedEvent { id, payload }
    }

    fn config(byte_limit: usize, group_size: usize) -> EmitterConfig {
        EmitterConfig {
            buffer_group_size: group_size,
            byte_limit_get: byte_limit,
            byte_limit_post: byte_limit,
            ..Default::default()
        }
    }

    #[test]
    fn test_post_packs_group_of_two() {
        let events = [queued(1, 0), queued(2, 0)];
        let requests = build_requests(&events, HttpMethod::Post, &config(40_000, 2));

        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.event_ids, vec![1, 2]);
        assert!(!request.oversize);
        assert_eq!(request.payload["schema"], protocol::PAYLOAD_DATA_SCHEMA);
        assert_eq!(request.payload["data"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_post_group_size_splits_batches() {
        let events = [queued(1, 0), queued(2, 0), queued(3, 0)];
        let requests = build_requests(&events, HttpMethod::Post, &config(40_000, 2));

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].event_ids, vec![1, 2]);
        assert_eq!(requests[1].event_ids, vec![3]);
    }

    #[test]
    fn test_post_byte_budget_seals_group() {
        // Each payload is ~600 bytes; the budget holds one but not two
        let events = [queued(1, 500), queued(2, 500)];
        let requests = build_requests(&events, HttpMethod::Post, &config(800, 10));

        assert_eq!(requests.len(), 2);
        assert!(!requests[0].oversize);
        assert!(!requests[1].oversize);
        assert_eq!(requests[0].event_ids, vec![1]);
        assert_eq!(requests[1].event_ids, vec![2]);
    }

    #[test]
    fn test_post_oversize_ships_alone() {
        let events = [queued(1, 0), queued(2, 5_000), queued(3, 0)];
        let requests = build_requests(&events, HttpMethod::Post, &config(1_000, 10));

        assert_eq!(requests.len(), 2);

        let oversize: Vec<_> = requests.iter().filter(|r| r.oversize).collect();
        assert_eq!(oversize.len(), 1);
        assert_eq!(oversize[0].event_ids, vec![2]);

        // The small events still share one normal request
        let normal: Vec<_> = requests.iter().filter(|r| !r.oversize).collect();
        assert_eq!(normal[0].event_ids, vec![1, 3]);
    }

    #[test]
    fn test_get_one_request_per_event() {
        let events = [queued(1, 0), queued(2, 0)];
        let requests = build_requests(&events, HttpMethod::Get, &config(40_000, 10));

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].event_ids, vec![1]);
        assert_eq!(requests[1].event_ids, vec![2]);
        // GET bodies are flat payloads, not envelopes
        assert!(requests[0].payload.get("schema").is_none());
        assert!(requests[0].payload.get("e").is_some());
    }

    #[test]
    fn test_get_oversize_flagging() {
        let events = [queued(1, 2_000)];
        let requests = build_requests(&events, HttpMethod::Get, &config(1_000, 10));

        assert_eq!(requests.len(), 1);
        assert!(requests[0].oversize);
    }

    #[test]
    fn test_send_time_stamped_on_every_payload() {
        let events = [queued(1, 0)];
        let requests = build_requests(&events, HttpMethod::Post, &config(40_000, 10));
        let data = requests[0].payload["data"].as_array().unwrap();
        assert!(data[0].get(protocol::SENT_TIMESTAMP).is_some());
    }
}
