//! # Event Types
//!
//! Typed application events derived from decoded record payloads, and the tag identifying
//! which stream a consumer reads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::WatchmanError;

/// The stream a router consumes
///
/// All sources share the same envelope decoding; the tag only labels logs and selects
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// Periodic clock ticks
    Time,
    /// Internal watchman events
    Watchman,
    /// Events published by the cwrx API services
    Cwrx,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Watchman => "watchman",
            Self::Cwrx => "cwrx",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = WatchmanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(WatchmanError::Construction(
                "event source name is required".to_string(),
            )),
            "time" => Ok(Self::Time),
            "watchman" => Ok(Self::Watchman),
            "cwrx" => Ok(Self::Cwrx),
            other => Err(WatchmanError::Construction(format!(
                "unknown event source '{other}'"
            ))),
        }
    }
}

/// A named application event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub data: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Derive an event from a decoded record envelope `{type, data}`
    ///
    /// Returns `None` when the envelope has no string `type`; that is "no event", not an
    /// error. A missing `data` field becomes `null`.
    pub fn decode(raw: &Value) -> Option<Event> {
        let name = raw.get("type")?.as_str()?;
        let data = raw.get("data").cloned().unwrap_or(Value::Null);
        Some(Event::new(name, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_envelope() {
        let event = Event::decode(&json!({ "type": "tick", "data": { "n": 1 } })).unwrap();
        assert_eq!(event.name, "tick");
        assert_eq!(event.data, json!({ "n": 1 }));
    }

    #[test]
    fn test_decode_without_data() {
        let event = Event::decode(&json!({ "type": "tick" })).unwrap();
        assert_eq!(event.data, Value::Null);
    }

    #[test]
    fn test_decode_without_type_is_no_event() {
        assert!(Event::decode(&json!({ "data": { "n": 1 } })).is_none());
        assert!(Event::decode(&json!({ "type": 7 })).is_none());
        assert!(Event::decode(&json!("tick")).is_none());
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!("cwrx".parse::<EventSource>().unwrap(), EventSource::Cwrx);
        assert_eq!(EventSource::Time.to_string(), "time");
        assert!(matches!(
            "".parse::<EventSource>(),
            Err(WatchmanError::Construction(_))
        ));
        assert!(matches!(
            "kafka".parse::<EventSource>(),
            Err(WatchmanError::Construction(_))
        ));
    }
}
