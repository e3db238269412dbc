//! Push channel wire frames.
//!
//! Every frame is one WebSocket text message holding
//! `{"event": <name>, "data": <payload>}`. Event names follow the browser
//! client: the server emits `initial-messages` once on connect and
//! `message-update` after every append; clients emit `new-message`.

use pollcast_core::Snapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full history, sent once right after the connection opens.
    InitialMessages(Snapshot),
    /// Full list after an append, sent to every connected client.
    MessageUpdate(Snapshot),
    /// A client frame was rejected. The connection stays open.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    NewMessage(String),
}

impl ServerEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use pollcast_core::Message;

    use super::*;

    fn snapshot() -> Snapshot {
        Arc::new(vec![Message::new(
            "hi",
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )])
    }

    #[test]
    fn initial_messages_frame_shape() {
        let json = ServerEvent::InitialMessages(snapshot()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "initial-messages");
        assert_eq!(value["data"][0]["text"], "hi");
        assert_eq!(value["data"][0]["timestamp"], "2026-01-01T00:00:00Z");
    }

    #[test]
    fn message_update_frame_shape() {
        let json = ServerEvent::MessageUpdate(Arc::new(Vec::new())).to_json().unwrap();
        assert_eq!(json, r#"{"event":"message-update","data":[]}"#);
    }

    #[test]
    fn error_frame_shape() {
        let json = ServerEvent::Error("bad frame".into()).to_json().unwrap();
        assert_eq!(json, r#"{"event":"error","data":"bad frame"}"#);
    }

    #[test]
    fn parse_new_message() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"event":"new-message","data":"hello"}"#).unwrap();
        assert_eq!(ev, ClientEvent::NewMessage("hello".into()));
    }

    #[test]
    fn reject_unknown_event_and_non_string_data() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"delete","data":"x"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"new-message","data":5}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>("not json").is_err());
    }

    #[test]
    fn server_event_round_trips_for_clients() {
        let ev = ServerEvent::MessageUpdate(snapshot());
        let parsed: ServerEvent = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(parsed, ev);
    }
}
