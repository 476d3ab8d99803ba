// =============================================================================
// Conclave Federated Room Server - Timeline Data Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Storage contract for event bodies and metadata: raw JSON keyed by
//   event NID, depth-indexed per room, state-at-event records and the
//   reference edges used for backward region extension.
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

use std::sync::Arc;

use super::{EventMeta, StateAtEvent};
use crate::{service::pdu::PduEvent, Result};

pub trait Data: Send + Sync {
    /// Persists an event body and its metadata. Idempotent: inserting an
    /// already-known NID is a no-op.
    fn insert_event(&self, event_nid: u64, meta: &EventMeta, raw: &[u8]) -> Result<()>;

    /// The parsed event, without read-time redaction applied.
    fn get_pdu(&self, event_nid: u64) -> Result<Option<Arc<PduEvent>>>;

    fn event_meta(&self, event_nid: u64) -> Result<Option<EventMeta>>;

    fn set_rejected(&self, event_nid: u64, reason: &str) -> Result<()>;

    fn set_redacted(&self, event_nid: u64) -> Result<()>;

    fn set_state_at(&self, event_nid: u64, state: &StateAtEvent) -> Result<()>;

    fn state_at(&self, event_nid: u64) -> Result<Option<StateAtEvent>>;

    /// Records that `event_nid` lists each of `prev_nids` among its prev
    /// events.
    fn mark_as_referenced(&self, event_nid: u64, prev_nids: &[u64]) -> Result<()>;

    /// The events that reference `event_nid` as a prev event.
    fn referencing(&self, event_nid: u64) -> Result<Vec<u64>>;

    /// Event NIDs of a room with depth less than or equal to the given
    /// depth, in ascending depth order.
    fn events_up_to_depth(&self, room_nid: u64, depth: u64) -> Result<Vec<u64>>;

    /// Drops an event body, its state-at record and its depth index entry.
    /// Interned identifiers stay allocated.
    fn purge_event(&self, room_nid: u64, depth: u64, event_nid: u64) -> Result<()>;
}
