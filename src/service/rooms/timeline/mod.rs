// =============================================================================
// Conclave Federated Room Server - Timeline Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   The event store. Every accepted event body lives here under its NID,
//   together with the snapshot NIDs of the state before and after it.
//   Events are immutable once written; rejection and redaction are flags
//   applied on top, never edits to the stored bytes.
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

use std::{collections::HashSet, sync::Arc};

pub use data::Data;
use ruma::OwnedEventId;
use tracing::debug;

use crate::{
    api::EventKind,
    service::{pdu::PduEvent, rooms::state::StateEntry},
    services, Error, Result,
};

/// Metadata stored beside every event body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventMeta {
    pub room_nid: u64,
    pub depth: u64,
    pub kind: EventKind,
    pub event_type_nid: u64,
    /// Present only for state events.
    pub state_key_nid: Option<u64>,
    pub rejected: bool,
    pub redacted: bool,
}

/// The state associated with an in-region event: the snapshots before and
/// after it and, for state events, the entry the event itself contributes.
/// Outliers have no record here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateAtEvent {
    pub before_state_nid: u64,
    pub after_state_nid: u64,
    pub entry: Option<StateEntry>,
}

pub struct Service {
    pub db: &'static dyn Data,
}

impl Service {
    pub fn insert_event(&self, event_nid: u64, meta: &EventMeta, pdu: &PduEvent) -> Result<()> {
        self.db.insert_event(event_nid, meta, pdu.raw())
    }

    /// Returns the parsed event with read-time redaction applied.
    #[tracing::instrument(skip(self))]
    pub fn get_pdu(&self, event_nid: u64) -> Result<Option<Arc<PduEvent>>> {
        let Some(pdu) = self.db.get_pdu(event_nid)? else {
            return Ok(None);
        };
        let Some(meta) = self.db.event_meta(event_nid)? else {
            return Ok(Some(pdu));
        };
        if meta.redacted {
            return Ok(Some(Arc::new(pdu.to_redacted()?)));
        }
        Ok(Some(pdu))
    }

    pub fn event_meta(&self, event_nid: u64) -> Result<Option<EventMeta>> {
        self.db.event_meta(event_nid)
    }

    pub fn set_rejected(&self, event_nid: u64, reason: &str) -> Result<()> {
        self.db.set_rejected(event_nid, reason)
    }

    pub fn set_redacted(&self, event_nid: u64) -> Result<()> {
        self.db.set_redacted(event_nid)
    }

    pub fn set_state_at(&self, event_nid: u64, state: &StateAtEvent) -> Result<()> {
        self.db.set_state_at(event_nid, state)
    }

    pub fn state_at(&self, event_nid: u64) -> Result<Option<StateAtEvent>> {
        self.db.state_at(event_nid)
    }

    pub fn mark_as_referenced(&self, event_nid: u64, prev_nids: &[u64]) -> Result<()> {
        self.db.mark_as_referenced(event_nid, prev_nids)
    }

    pub fn referencing(&self, event_nid: u64) -> Result<Vec<u64>> {
        self.db.referencing(event_nid)
    }

    /// Looks up the state at each of the given events. Fails with
    /// `MissingState` when any of them is unknown or an outlier, which
    /// defers the input until the missing events arrive.
    pub fn state_at_events(&self, event_ids: &[OwnedEventId]) -> Result<Vec<(u64, StateAtEvent)>> {
        let mut results = Vec::with_capacity(event_ids.len());
        for event_id in event_ids {
            let event_nid = services()
                .rooms
                .short
                .get_eventnid(event_id)?
                .ok_or_else(|| {
                    Error::MissingState(format!("missing state at prev event {event_id}"))
                })?;
            let state = self.db.state_at(event_nid)?.ok_or_else(|| {
                Error::MissingState(format!("missing state at prev event {event_id}"))
            })?;
            results.push((event_nid, state));
        }
        Ok(results)
    }

    /// Resolves already-persisted state events into their state entries.
    /// Used when an input names the full state before an event.
    pub fn state_entries_for(&self, event_ids: &[OwnedEventId]) -> Result<Vec<StateEntry>> {
        let mut entries = Vec::with_capacity(event_ids.len());
        for event_id in event_ids {
            let event_nid = services()
                .rooms
                .short
                .get_eventnid(event_id)?
                .ok_or_else(|| {
                    Error::MissingState(format!("state event {event_id} is not persisted"))
                })?;
            let meta = self.db.event_meta(event_nid)?.ok_or_else(|| {
                Error::MissingState(format!("state event {event_id} is not persisted"))
            })?;
            let state_key_nid = meta.state_key_nid.ok_or_else(|| {
                Error::MissingState(format!("event {event_id} is not a state event"))
            })?;
            entries.push(StateEntry {
                event_type_nid: meta.event_type_nid,
                state_key_nid,
                event_nid,
            });
        }
        Ok(entries)
    }

    /// Removes in-region event bodies with depth at or below the cut,
    /// preserving everything in the keep set (current state and region
    /// tips). Returns the number of purged events.
    #[tracing::instrument(skip(self, keep))]
    pub fn purge_history(&self, room_nid: u64, depth: u64, keep: &HashSet<u64>) -> Result<usize> {
        let mut purged = 0;
        for event_nid in self.db.events_up_to_depth(room_nid, depth)? {
            if keep.contains(&event_nid) {
                continue;
            }
            // Outliers have no state-at record and are left alone; they may
            // still be needed as auth ancestors.
            let Some(_state) = self.db.state_at(event_nid)? else {
                continue;
            };
            let Some(meta) = self.db.event_meta(event_nid)? else {
                continue;
            };
            self.db.purge_event(room_nid, meta.depth, event_nid)?;
            purged += 1;
        }
        debug!("🔧 Purged {} events up to depth {}", purged, depth);
        Ok(purged)
    }
}
