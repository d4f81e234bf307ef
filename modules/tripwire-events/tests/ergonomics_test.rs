//! Ergonomics and usage pattern tests for the event type.

use chrono::{TimeZone, Utc};
use serde_json::json;
use tripwire_events::Event;

// =========================================================================
// Event builder ergonomics
// =========================================================================

#[test]
fn event_minimal_construction() {
    let event = Event::new("order.created");
    assert_eq!(event.event_type, "order.created");
    assert!(event.data.is_empty());
    assert!(!event.has("total"));
}

#[test]
fn event_full_builder_chain() {
    let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
    let event = Event::new("order.created")
        .with("total", 120.5)
        .with("customer", "ada")
        .with("items", json!(["book", "pen"]))
        .with_timestamp(ts);

    assert_eq!(event.get("total"), Some(&json!(120.5)));
    assert_eq!(event.get("customer"), Some(&json!("ada")));
    assert_eq!(event.get("items"), Some(&json!(["book", "pen"])));
    assert_eq!(event.ts, ts);
}

#[test]
fn event_payload_merges_object_fields() {
    let event = Event::new("sensor.reading")
        .with("room", "kitchen")
        .with_payload(json!({"temperature": 31, "humidity": 0.4}));

    assert_eq!(event.data.len(), 3);
    assert_eq!(event.get("temperature"), Some(&json!(31)));
}

#[test]
fn events_get_distinct_ids() {
    let a = Event::new("tick");
    let b = Event::new("tick");
    assert_ne!(a.id, b.id);
}

#[test]
fn event_is_serializable() {
    // Events can be serialized for debugging, logging, admin UI
    let event = Event::new("player.died").with("level", 7);

    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("player.died"));
    assert!(json.contains("level"));

    let roundtripped: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(roundtripped.id, event.id);
    assert_eq!(roundtripped.get("level"), Some(&json!(7)));
}
