// =============================================================================
// Conclave Federated Room Server - Key Value Timeline Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Event bodies, metadata, state-at-event records, reference edges and
//   the per-room depth index, all in big-endian composite keys.
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

use std::{mem::size_of, sync::Arc};

use crate::{
    api::EventKind,
    database::KeyValueDatabase,
    service::{
        self,
        pdu::PduEvent,
        rooms::{
            state::StateEntry,
            timeline::{EventMeta, StateAtEvent},
        },
    },
    utils, Error, Result,
};

const FLAG_REJECTED: u8 = 1 << 0;
const FLAG_REDACTED: u8 = 1 << 1;

// room_nid(8) depth(8) event_type_nid(8) state_key_nid(8) kind(1) flags(1)
const META_FIXED_LEN: usize = 4 * size_of::<u64>() + 2;

fn meta_to_bytes(meta: &EventMeta, reject_reason: &str) -> Vec<u8> {
    let mut value = Vec::with_capacity(META_FIXED_LEN + reject_reason.len());
    value.extend_from_slice(&meta.room_nid.to_be_bytes());
    value.extend_from_slice(&meta.depth.to_be_bytes());
    value.extend_from_slice(&meta.event_type_nid.to_be_bytes());
    value.extend_from_slice(&meta.state_key_nid.unwrap_or(0).to_be_bytes());
    value.push(meta.kind.as_u8());
    let mut flags = 0;
    if meta.rejected {
        flags |= FLAG_REJECTED;
    }
    if meta.redacted {
        flags |= FLAG_REDACTED;
    }
    value.push(flags);
    value.extend_from_slice(reject_reason.as_bytes());
    value
}

fn meta_from_bytes(bytes: &[u8]) -> Result<(EventMeta, String)> {
    if bytes.len() < META_FIXED_LEN {
        return Err(Error::bad_database("event metadata has wrong length"));
    }
    let room_nid = utils::u64_from_bytes(&bytes[0..8]).expect("slice has the right length");
    let depth = utils::u64_from_bytes(&bytes[8..16]).expect("slice has the right length");
    let event_type_nid = utils::u64_from_bytes(&bytes[16..24]).expect("slice has the right length");
    let state_key_nid =
        match utils::u64_from_bytes(&bytes[24..32]).expect("slice has the right length") {
            0 => None,
            nid => Some(nid),
        };
    let kind = EventKind::from_u8(bytes[32])
        .map_err(|_| Error::bad_database("event metadata has an unknown kind"))?;
    let flags = bytes[33];
    let reject_reason = utils::string_from_bytes(&bytes[META_FIXED_LEN..])
        .map_err(|_| Error::bad_database("rejection reason is not valid UTF-8"))?;

    Ok((
        EventMeta {
            room_nid,
            depth,
            kind,
            event_type_nid,
            state_key_nid,
            rejected: flags & FLAG_REJECTED != 0,
            redacted: flags & FLAG_REDACTED != 0,
        },
        reject_reason,
    ))
}

fn state_at_to_bytes(state: &StateAtEvent) -> Vec<u8> {
    let mut value = Vec::with_capacity(2 * size_of::<u64>() + 1 + StateEntry::SIZE);
    value.extend_from_slice(&state.before_state_nid.to_be_bytes());
    value.extend_from_slice(&state.after_state_nid.to_be_bytes());
    match &state.entry {
        Some(entry) => {
            value.push(1);
            value.extend_from_slice(&entry.to_bytes());
        }
        None => value.push(0),
    }
    value
}

fn state_at_from_bytes(bytes: &[u8]) -> Result<StateAtEvent> {
    if bytes.len() < 2 * size_of::<u64>() + 1 {
        return Err(Error::bad_database("state-at record has wrong length"));
    }
    let before_state_nid = utils::u64_from_bytes(&bytes[0..8]).expect("slice has the right length");
    let after_state_nid = utils::u64_from_bytes(&bytes[8..16]).expect("slice has the right length");
    let entry = match bytes[16] {
        0 => None,
        _ => Some(StateEntry::from_bytes(&bytes[17..])?),
    };
    Ok(StateAtEvent {
        before_state_nid,
        after_state_nid,
        entry,
    })
}

impl service::rooms::timeline::Data for KeyValueDatabase {
    fn insert_event(&self, event_nid: u64, meta: &EventMeta, raw: &[u8]) -> Result<()> {
        // Idempotent by NID: a crash between insert and output emission is
        // recovered by replaying the same input.
        if self.eventnid_pdu.get(&event_nid.to_be_bytes())?.is_some() {
            return Ok(());
        }

        self.eventnid_pdu.insert(&event_nid.to_be_bytes(), raw)?;
        self.eventnid_meta
            .insert(&event_nid.to_be_bytes(), &meta_to_bytes(meta, ""))?;

        let mut index_key = meta.room_nid.to_be_bytes().to_vec();
        index_key.extend_from_slice(&meta.depth.to_be_bytes());
        index_key.extend_from_slice(&event_nid.to_be_bytes());
        self.roomnid_depth_eventnid.insert(&index_key, &[])?;
        Ok(())
    }

    fn get_pdu(&self, event_nid: u64) -> Result<Option<Arc<PduEvent>>> {
        if let Some(pdu) = self.pdu_cache.lock().unwrap().get_mut(&event_nid) {
            return Ok(Some(Arc::clone(pdu)));
        }

        let Some(raw) = self.eventnid_pdu.get(&event_nid.to_be_bytes())? else {
            return Ok(None);
        };
        let pdu = Arc::new(
            PduEvent::parse(&raw)
                .map_err(|_| Error::bad_database("stored event does not parse"))?,
        );
        self.pdu_cache
            .lock()
            .unwrap()
            .insert(event_nid, Arc::clone(&pdu));
        Ok(Some(pdu))
    }

    fn event_meta(&self, event_nid: u64) -> Result<Option<EventMeta>> {
        self.eventnid_meta
            .get(&event_nid.to_be_bytes())?
            .map(|bytes| meta_from_bytes(&bytes).map(|(meta, _)| meta))
            .transpose()
    }

    fn set_rejected(&self, event_nid: u64, reason: &str) -> Result<()> {
        let bytes = self
            .eventnid_meta
            .get(&event_nid.to_be_bytes())?
            .ok_or_else(|| Error::bad_database("rejected event has no metadata"))?;
        let (mut meta, _) = meta_from_bytes(&bytes)?;
        meta.rejected = true;
        self.eventnid_meta
            .insert(&event_nid.to_be_bytes(), &meta_to_bytes(&meta, reason))
    }

    fn set_redacted(&self, event_nid: u64) -> Result<()> {
        let bytes = self
            .eventnid_meta
            .get(&event_nid.to_be_bytes())?
            .ok_or_else(|| Error::bad_database("redacted event has no metadata"))?;
        let (mut meta, reason) = meta_from_bytes(&bytes)?;
        meta.redacted = true;
        self.eventnid_meta
            .insert(&event_nid.to_be_bytes(), &meta_to_bytes(&meta, &reason))
    }

    fn set_state_at(&self, event_nid: u64, state: &StateAtEvent) -> Result<()> {
        self.eventnid_stateat
            .insert(&event_nid.to_be_bytes(), &state_at_to_bytes(state))
    }

    fn state_at(&self, event_nid: u64) -> Result<Option<StateAtEvent>> {
        self.eventnid_stateat
            .get(&event_nid.to_be_bytes())?
            .map(|bytes| state_at_from_bytes(&bytes))
            .transpose()
    }

    fn mark_as_referenced(&self, event_nid: u64, prev_nids: &[u64]) -> Result<()> {
        let mut batch = prev_nids.iter().map(|prev_nid| {
            let mut key = prev_nid.to_be_bytes().to_vec();
            key.extend_from_slice(&event_nid.to_be_bytes());
            (key, Vec::new())
        });
        self.referenced_eventnids.insert_batch(&mut batch)
    }

    fn referencing(&self, event_nid: u64) -> Result<Vec<u64>> {
        let mut successors = Vec::new();
        for (key, _) in self
            .referenced_eventnids
            .scan_prefix(event_nid.to_be_bytes().to_vec())
        {
            if key.len() != 2 * size_of::<u64>() {
                return Err(Error::bad_database("reference key has wrong length"));
            }
            successors
                .push(utils::u64_from_bytes(&key[8..16]).expect("slice has the right length"));
        }
        Ok(successors)
    }

    fn events_up_to_depth(&self, room_nid: u64, depth: u64) -> Result<Vec<u64>> {
        let mut event_nids = Vec::new();
        for (key, _) in self
            .roomnid_depth_eventnid
            .scan_prefix(room_nid.to_be_bytes().to_vec())
        {
            if key.len() != 3 * size_of::<u64>() {
                return Err(Error::bad_database("depth index key has wrong length"));
            }
            let event_depth =
                utils::u64_from_bytes(&key[8..16]).expect("slice has the right length");
            if event_depth > depth {
                // Keys sort by depth within the room prefix.
                break;
            }
            event_nids
                .push(utils::u64_from_bytes(&key[16..24]).expect("slice has the right length"));
        }
        Ok(event_nids)
    }

    fn purge_event(&self, room_nid: u64, depth: u64, event_nid: u64) -> Result<()> {
        self.eventnid_pdu.remove(&event_nid.to_be_bytes())?;
        self.eventnid_stateat.remove(&event_nid.to_be_bytes())?;

        let mut index_key = room_nid.to_be_bytes().to_vec();
        index_key.extend_from_slice(&depth.to_be_bytes());
        index_key.extend_from_slice(&event_nid.to_be_bytes());
        self.roomnid_depth_eventnid.remove(&index_key)?;

        self.pdu_cache.lock().unwrap().remove(&event_nid);
        Ok(())
    }
}
