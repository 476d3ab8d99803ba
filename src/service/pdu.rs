// =============================================================================
// Conclave Federated Room Server - Pdu Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Immutable parsed view of a room event. The verbatim raw bytes are kept
//   beside the typed fields so hashing and signature checks downstream
//   always see exactly what was received.
//
// Architecture:
//   • Async/await native implementation
//   • Single writer per room, parallel across rooms
//   • Append-only storage with monotonic numeric identifiers
//
// Dependencies:
//   • Tokio async runtime
//   • Structured logging with tracing
//   • Error handling with thiserror
//   • Serialization with serde
//   • Matrix protocol types with ruma
//
// References:
//   • Matrix.org specification: https://matrix.org/
//   • Matrix spec: https://spec.matrix.org/
//
// =============================================================================

use ruma::{
    canonical_json::redact_content_in_place, events::TimelineEventType, CanonicalJsonObject,
    EventId, OwnedEventId, OwnedRoomId, OwnedUserId, RoomVersionId, UInt,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::{to_raw_value, RawValue as RawJsonValue};

use crate::{Error, Result};

/// Reference to a predecessor or auth event.
///
/// The wire format varies: modern events reference by bare event id, older
/// ones by an `[event_id, hashes]` pair or an object with an `event_id`
/// key. All three deserialize into this one shape; the hashes are not
/// interpreted here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventReference {
    pub event_id: OwnedEventId,
}

impl<'de> Deserialize<'de> for EventReference {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Pair(OwnedEventId, serde_json::Value),
            Object { event_id: OwnedEventId },
            Bare(OwnedEventId),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Pair(event_id, _) => Self { event_id },
            Repr::Object { event_id } => Self { event_id },
            Repr::Bare(event_id) => Self { event_id },
        })
    }
}

impl Serialize for EventReference {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Repr<'a> {
            event_id: &'a EventId,
        }

        Repr {
            event_id: &self.event_id,
        }
        .serialize(serializer)
    }
}

/// A parsed room event. Read-only after construction; the raw bytes and
/// the typed view never drift because the view is only ever produced by
/// [`PduEvent::parse`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PduEvent {
    pub event_id: OwnedEventId,
    pub room_id: OwnedRoomId,
    pub sender: OwnedUserId,
    #[serde(rename = "type")]
    pub kind: TimelineEventType,
    pub content: Box<RawJsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(default)]
    pub prev_events: Vec<EventReference>,
    pub depth: UInt,
    #[serde(default)]
    pub auth_events: Vec<EventReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<OwnedEventId>,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl PduEvent {
    /// Parses raw event JSON, retaining the input bytes verbatim.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut pdu: PduEvent = serde_json::from_slice(raw)
            .map_err(|e| Error::InvalidEvent(format!("event JSON did not parse: {e}")))?;
        pdu.raw = raw.to_vec();
        Ok(pdu)
    }

    /// The bytes this event was parsed from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Whether this event carries a `state_key`. An absent key and a
    /// present-but-empty key are different things.
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    pub fn state_key_equals(&self, state_key: &str) -> bool {
        self.state_key.as_deref() == Some(state_key)
    }

    pub fn prev_event_ids(&self) -> impl Iterator<Item = &EventId> {
        self.prev_events.iter().map(|r| &*r.event_id)
    }

    /// Copy of this event with the content stripped down to the keys that
    /// survive redaction. The stored raw bytes are not touched; redaction
    /// is a read-time effect.
    pub fn to_redacted(&self) -> Result<Self> {
        let mut content: CanonicalJsonObject = serde_json::from_str(self.content.get())
            .map_err(|_| Error::InvalidEvent("event content is not a JSON object".to_owned()))?;
        redact_content_in_place(&mut content, &RoomVersionId::V1, self.kind.to_string())
            .map_err(|e| Error::InvalidEvent(format!("failed to redact content: {e}")))?;

        let mut pdu = self.clone();
        pdu.content = to_raw_value(&content).expect("CanonicalJsonObject serializes to JSON");
        Ok(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_event_json() -> Vec<u8> {
        serde_json::json!({
            "event_id": "$create:example.com",
            "room_id": "!room:example.com",
            "sender": "@alice:example.com",
            "type": "m.room.create",
            "state_key": "",
            "content": {"creator": "@alice:example.com"},
            "prev_events": [],
            "depth": 0,
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_parse_retains_raw_bytes() {
        let raw = create_event_json();
        let pdu = PduEvent::parse(&raw).unwrap();
        assert_eq!(pdu.raw(), &raw[..]);
        assert_eq!(pdu.event_id.as_str(), "$create:example.com");
        assert_eq!(pdu.kind, TimelineEventType::RoomCreate);
        assert!(pdu.is_state());
        assert!(pdu.state_key_equals(""));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            PduEvent::parse(b"{not json"),
            Err(Error::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_required_fields() {
        let raw = serde_json::json!({
            "event_id": "$x:example.com",
            "room_id": "!room:example.com",
            "type": "m.room.message",
            "content": {},
            "depth": 1,
        })
        .to_string()
        .into_bytes();
        // No sender.
        assert!(matches!(
            PduEvent::parse(&raw),
            Err(Error::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_absent_and_empty_state_key_differ() {
        let raw = serde_json::json!({
            "event_id": "$msg:example.com",
            "room_id": "!room:example.com",
            "sender": "@alice:example.com",
            "type": "m.room.message",
            "content": {"body": "hi"},
            "prev_events": ["$create:example.com"],
            "depth": 1,
        })
        .to_string()
        .into_bytes();
        let pdu = PduEvent::parse(&raw).unwrap();
        assert!(!pdu.is_state());
        assert!(!pdu.state_key_equals(""));
    }

    #[test]
    fn test_prev_event_reference_forms() {
        let raw = serde_json::json!({
            "event_id": "$child:example.com",
            "room_id": "!room:example.com",
            "sender": "@alice:example.com",
            "type": "m.room.message",
            "content": {},
            "prev_events": [
                "$bare:example.com",
                ["$pair:example.com", {"sha256": "abcd"}],
                {"event_id": "$object:example.com"},
            ],
            "depth": 4,
        })
        .to_string()
        .into_bytes();

        let pdu = PduEvent::parse(&raw).unwrap();
        let ids: Vec<_> = pdu.prev_event_ids().map(|id| id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "$bare:example.com",
                "$pair:example.com",
                "$object:example.com"
            ]
        );
    }

    #[test]
    fn test_redaction_keeps_protected_keys() {
        let raw = serde_json::json!({
            "event_id": "$member:example.com",
            "room_id": "!room:example.com",
            "sender": "@alice:example.com",
            "type": "m.room.member",
            "state_key": "@alice:example.com",
            "content": {"membership": "join", "displayname": "Alice"},
            "prev_events": ["$create:example.com"],
            "depth": 1,
        })
        .to_string()
        .into_bytes();

        let pdu = PduEvent::parse(&raw).unwrap();
        let redacted = pdu.to_redacted().unwrap();
        let content: serde_json::Value = serde_json::from_str(redacted.content.get()).unwrap();
        assert_eq!(content["membership"], "join");
        assert!(content.get("displayname").is_none());
        // The original is untouched.
        let original: serde_json::Value = serde_json::from_str(pdu.content.get()).unwrap();
        assert_eq!(original["displayname"], "Alice");
    }
}
