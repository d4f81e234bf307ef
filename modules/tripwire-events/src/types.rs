//! Core event type. Domain-agnostic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named occurrence with a key/value payload.
///
/// The caller builds this; once handed to an engine it is shared read-only
/// with every listener, condition and action of the firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: String,
    pub data: HashMap<String, serde_json::Value>,
    pub ts: DateTime<Utc>,
}

impl Event {
    /// Create an empty event of the given type, stamped now.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            data: HashMap::new(),
            ts: Utc::now(),
        }
    }

    /// Add a payload field, consuming the event.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Add a payload field in place. Overwrites an existing value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> &mut Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Merge the fields of a JSON object into the payload, overwriting
    /// existing keys. Non-object values leave the payload untouched.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = payload {
            self.data.extend(map);
        }
        self
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}
