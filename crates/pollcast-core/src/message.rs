//! Message record and the snapshot type every delivery mode hands out.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// One chat message. Its position in the log is its only identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    /// Serialized as an ISO-8601 / RFC 3339 string.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }
}

/// Immutable view of the full ordered log at one point in time.
///
/// Cloning is a reference-count bump; later appends never show up in an
/// already-taken snapshot.
pub type Snapshot = Arc<Vec<Message>>;

/// Pick a timestamp for a message appended after `previous`.
///
/// Log order and timestamp order must agree, so a clock that has not moved
/// (or moved backwards) yields `previous + 1ns`.
pub(crate) fn next_timestamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + TimeDelta::nanoseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
    }

    #[test]
    fn serializes_text_and_iso_timestamp() {
        let msg = Message::new("hello", at(0));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["timestamp"], "2026-01-01T00:00:00Z");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn deserializes_from_wire_shape() {
        let json = r#"{"text":"world","timestamp":"2026-01-01T00:00:05.250Z"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.text, "world");
        assert_eq!(msg.timestamp, at(5) + TimeDelta::milliseconds(250));
    }

    #[test]
    fn next_timestamp_uses_clock_when_it_advanced() {
        assert_eq!(next_timestamp(None, at(3)), at(3));
        assert_eq!(next_timestamp(Some(at(1)), at(3)), at(3));
    }

    #[test]
    fn next_timestamp_stays_strictly_increasing() {
        let same = next_timestamp(Some(at(3)), at(3));
        assert!(same > at(3));

        let backwards = next_timestamp(Some(at(3)), at(1));
        assert_eq!(backwards, at(3) + TimeDelta::nanoseconds(1));
    }
}
