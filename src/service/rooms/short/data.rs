// =============================================================================
// Conclave Federated Room Server - Short Data Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Storage contract for identifier interning: rooms, event ids, event
//   types and state keys all map to compact numeric identifiers assigned
//   once and never reused.
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

use ruma::{events::TimelineEventType, EventId, OwnedEventId, RoomId};

use crate::Result;

pub trait Data: Send + Sync {
    /// Looks up the numeric room id for a room id string. Returns `None`
    /// for rooms we have never seen.
    fn get_roomnid(&self, room_id: &RoomId) -> Result<Option<u64>>;

    /// Registers a new room under a previously drawn room NID.
    fn insert_new_room(&self, room_nid: u64, room_id: &RoomId) -> Result<()>;

    /// Assigns numeric ids to the given event ids. Existing ids keep their
    /// NIDs, new ids get fresh sequential ones. The second return value is
    /// the smallest newly assigned NID, or 0 when every id already existed,
    /// letting callers tell the truly-new entries apart.
    fn assign_event_nids(&self, event_ids: &[OwnedEventId]) -> Result<(Vec<u64>, u64)>;

    fn get_eventnid(&self, event_id: &EventId) -> Result<Option<u64>>;

    fn get_eventid_from_nid(&self, event_nid: u64) -> Result<OwnedEventId>;

    fn get_or_create_eventtype_nid(&self, event_type: &TimelineEventType) -> Result<u64>;

    fn get_eventtype_nid(&self, event_type: &TimelineEventType) -> Result<Option<u64>>;

    fn get_eventtype_from_nid(&self, event_type_nid: u64) -> Result<TimelineEventType>;

    fn get_or_create_statekey_nid(&self, state_key: &str) -> Result<u64>;

    fn get_statekey_nid(&self, state_key: &str) -> Result<Option<u64>>;

    fn get_statekey_from_nid(&self, state_key_nid: u64) -> Result<String>;
}
