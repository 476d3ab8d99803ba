// =============================================================================
// Conclave Federated Room Server - Api Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Input and output records exchanged with the producers and consumers of
//   the room pipeline: event submissions, history pruning, redaction
//   intents and the emitted output log records.
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

use ruma::{OwnedEventId, OwnedRoomId};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How an inbound event relates to the room's contiguous event graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Outlier events fall outside the contiguous event graph. We do not
    /// have the state for these events; they are state events used to
    /// authenticate other events and can join the graph later via backfill.
    Outlier = 1,
    /// Join events start a new contiguous event graph for this server. The
    /// input either carries the full state before the event or the room
    /// already has an active region.
    Join = 2,
    /// New events extend the contiguous graph going forwards. They usually
    /// need no state, but may include it when they reference an event we do
    /// not have a copy of.
    New = 3,
    /// Backfilled events extend the contiguous graph going backwards. They
    /// always have state.
    Backfill = 4,
}

impl EventKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Outlier),
            2 => Ok(Self::Join),
            3 => Ok(Self::New),
            4 => Ok(Self::Backfill),
            other => Err(Error::InvalidEvent(format!("unknown event kind: {other}"))),
        }
    }
}

/// A single event submitted to the room pipeline.
#[derive(Clone, Debug)]
pub struct InputEvent {
    /// Whether the event is new, backfilled, a join or an outlier.
    pub kind: EventKind,
    /// The raw event JSON.
    pub event: Vec<u8>,
    /// Optional list of state events forming the state before this event.
    /// These state events must have already been persisted.
    pub state: Option<Vec<OwnedEventId>>,
}

/// Removes in-region history up to a depth, preserving the current state.
#[derive(Clone, Debug)]
pub struct InputPurgeHistory {
    /// The room to remove history from.
    pub room_id: OwnedRoomId,
    /// The depth to purge history up to, inclusive.
    pub depth: u64,
}

/// Records a redaction intent against each listed event. Content stripping
/// is applied at read time; the stored bytes stay immutable.
#[derive(Clone, Debug)]
pub struct InputRedact {
    pub event_ids: Vec<OwnedEventId>,
}

/// A record appended to the output log for every processed input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputEvent {
    pub event_nid: u64,
    pub event_id: OwnedEventId,
    pub room_nid: u64,
    pub kind: EventKind,
    /// Snapshot of the room state before the event, 0 for outliers.
    pub state_before_nid: u64,
    /// Snapshot of the room state after the event, 0 for outliers.
    pub state_after_nid: u64,
    /// Whether the room's frontier state moved because of this event.
    pub current_state_changed: bool,
    pub rejected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trip() {
        for kind in [
            EventKind::Outlier,
            EventKind::Join,
            EventKind::New,
            EventKind::Backfill,
        ] {
            assert_eq!(EventKind::from_u8(kind.as_u8()).unwrap(), kind);
        }
        assert!(EventKind::from_u8(0).is_err());
        assert!(EventKind::from_u8(5).is_err());
    }

    #[test]
    fn test_output_event_serialization() {
        let output = OutputEvent {
            event_nid: 7,
            event_id: "$event:example.com".try_into().unwrap(),
            room_nid: 1,
            kind: EventKind::New,
            state_before_nid: 3,
            state_after_nid: 4,
            current_state_changed: true,
            rejected: false,
            reject_reason: None,
        };

        let json = serde_json::to_string(&output).unwrap();
        assert!(!json.contains("reject_reason"));

        let parsed: OutputEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_nid, 7);
        assert_eq!(parsed.kind, EventKind::New);
        assert!(parsed.current_state_changed);
    }
}
