//! Test fixtures and payload generators.

use bytes::Bytes;
use chrono::Utc;
use engine_core::SegmentEvent;
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A segment name no other test uses.
pub fn unique_segment(prefix: &str) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

/// Broker payload for one event, in its wire form.
pub fn event_payload(user_id: &str, segment: &str) -> Bytes {
    let event = SegmentEvent::new(user_id, segment);
    Bytes::from(event.encode().expect("event encodes"))
}

/// The minimal payload older producers send, without a timestamp.
pub fn legacy_payload(user_id: &str, segment: &str) -> Bytes {
    Bytes::from(format!(r#"{{"UserID":"{user_id}","Segment":"{segment}"}}"#))
}

pub fn malformed_payload() -> Bytes {
    Bytes::from_static(b"{\"UserID\": \"broken\"")
}

/// N well-formed payloads for users `user-0..N` in `segment`.
pub fn event_payloads(n: usize, segment: &str) -> Vec<Bytes> {
    (0..n)
        .map(|i| event_payload(&format!("user-{i}"), segment))
        .collect()
}

/// Body of the write endpoint.
pub fn add_segment_body(user_id: &str, segment: &str) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id,
        "segment": segment,
    })
}

/// Body of the read endpoint.
pub fn estimate_body(segment: &str) -> serde_json::Value {
    serde_json::json!({ "segment": segment })
}
