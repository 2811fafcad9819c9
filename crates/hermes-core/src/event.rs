//! The persisted record for an authenticated client event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Origin tag written into every stored event.
pub const EVENT_SOURCE: &str = "hermes";

/// An event reported by an authenticated client, as handed to the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Event name, taken from the envelope kind.
    pub name: String,
    /// Origin of the event. Always [`EVENT_SOURCE`] for events built here.
    #[serde(rename = "src")]
    pub source: String,
    /// When the event was captured for persistence.
    pub timestamp: DateTime<Utc>,
    /// Envelope payload, unchanged.
    pub data: Value,
}

impl StoredEvent {
    /// Build an event stamped with the current time.
    pub fn capture(name: impl Into<String>, data: Value) -> Self {
        Self::at(name, data, Utc::now())
    }

    /// Build an event with an explicit timestamp.
    pub fn at(name: impl Into<String>, data: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            source: EVENT_SOURCE.to_owned(),
            timestamp,
            data,
        }
    }

    /// Serialize for the store.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn capture_sets_source_and_timestamp() {
        let before = Utc::now();
        let event = StoredEvent::capture("book-viewed", json!("book-id"));
        assert_eq!(event.name, "book-viewed");
        assert_eq!(event.source, EVENT_SOURCE);
        assert!(event.timestamp >= before);
        assert_eq!(event.data, json!("book-id"));
    }

    #[test]
    fn serializes_source_as_src() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let event = StoredEvent::at("opened", json!({"id": 7}), ts);
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["name"], "opened");
        assert_eq!(value["src"], "hermes");
        assert_eq!(value["timestamp"], "2026-01-02T03:04:05Z");
        assert_eq!(value["data"]["id"], 7);
        assert!(value.get("source").is_none());
    }

    #[test]
    fn parses_back_from_store_form() {
        let event = StoredEvent::capture("x", json!([1, 2]));
        let back: StoredEvent = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(back, event);
    }
}
