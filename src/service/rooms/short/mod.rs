// =============================================================================
// Conclave Federated Room Server - Short Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Identifier interning service. String identifiers are interned into
//   64-bit NIDs so state entries and the region graph work on fixed-size
//   values instead of strings.
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

mod data;

pub use data::Data;
use ruma::{events::TimelineEventType, EventId, OwnedEventId, RoomId};

use crate::Result;

pub struct Service {
    pub db: &'static dyn Data,
}

impl Service {
    pub fn get_roomnid(&self, room_id: &RoomId) -> Result<Option<u64>> {
        self.db.get_roomnid(room_id)
    }

    pub fn insert_new_room(&self, room_nid: u64, room_id: &RoomId) -> Result<()> {
        self.db.insert_new_room(room_nid, room_id)
    }

    /// Returns `(nids, smallest_new_nid)`; a `smallest_new_nid` of 0 means
    /// every event id was already known.
    pub fn assign_event_nids(&self, event_ids: &[OwnedEventId]) -> Result<(Vec<u64>, u64)> {
        self.db.assign_event_nids(event_ids)
    }

    pub fn get_eventnid(&self, event_id: &EventId) -> Result<Option<u64>> {
        self.db.get_eventnid(event_id)
    }

    pub fn get_eventid_from_nid(&self, event_nid: u64) -> Result<OwnedEventId> {
        self.db.get_eventid_from_nid(event_nid)
    }

    pub fn get_or_create_eventtype_nid(&self, event_type: &TimelineEventType) -> Result<u64> {
        self.db.get_or_create_eventtype_nid(event_type)
    }

    pub fn get_eventtype_nid(&self, event_type: &TimelineEventType) -> Result<Option<u64>> {
        self.db.get_eventtype_nid(event_type)
    }

    pub fn get_eventtype_from_nid(&self, event_type_nid: u64) -> Result<TimelineEventType> {
        self.db.get_eventtype_from_nid(event_type_nid)
    }

    pub fn get_or_create_statekey_nid(&self, state_key: &str) -> Result<u64> {
        self.db.get_or_create_statekey_nid(state_key)
    }

    pub fn get_statekey_nid(&self, state_key: &str) -> Result<Option<u64>> {
        self.db.get_statekey_nid(state_key)
    }

    pub fn get_statekey_from_nid(&self, state_key_nid: u64) -> Result<String> {
        self.db.get_statekey_from_nid(state_key_nid)
    }
}
