// =============================================================================
// Conclave Federated Room Server - State Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   The delta-encoded room state store. Snapshots are ordered lists of
//   deduplicated state blocks; the effective state is the overlay of the
//   blocks in list order, with later blocks clobbering earlier entries for
//   the same tuple. Small state changes reuse prior blocks; long block
//   lists are compacted into a single equivalent block.
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

use std::{collections::BTreeMap, mem::size_of, sync::Mutex as StdMutex};

pub use data::Data;

use crate::{
    service::globals::Sequence,
    services, utils, Error, Result,
};

/// One state tuple assignment: `(event type, state key) → event`, all three
/// interned. Entries order by `(type, state key)` so blocks stay sorted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateEntry {
    pub event_type_nid: u64,
    pub state_key_nid: u64,
    pub event_nid: u64,
}

impl StateEntry {
    pub const SIZE: usize = 3 * size_of::<u64>();

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.event_type_nid.to_be_bytes());
        bytes[8..16].copy_from_slice(&self.state_key_nid.to_be_bytes());
        bytes[16..24].copy_from_slice(&self.event_nid.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(Error::bad_database("state entry has wrong length"));
        }
        Ok(Self {
            event_type_nid: utils::u64_from_bytes(&bytes[0..8])
                .expect("slice has the right length"),
            state_key_nid: utils::u64_from_bytes(&bytes[8..16])
                .expect("slice has the right length"),
            event_nid: utils::u64_from_bytes(&bytes[16..24])
                .expect("slice has the right length"),
        })
    }

    pub fn tuple(&self) -> (u64, u64) {
        (self.event_type_nid, self.state_key_nid)
    }
}

pub struct Service {
    pub db: &'static dyn Data,

    block_insert_mutex: StdMutex<()>,
}

impl Service {
    pub fn new(db: &'static dyn Data) -> Self {
        Self {
            db,
            block_insert_mutex: StdMutex::new(()),
        }
    }

    /// Deduplicating block insert: two blocks with the same sorted entry
    /// set share a single NID.
    pub fn insert_block(&self, entries: &[StateEntry]) -> Result<u64> {
        let mut entries = entries.to_vec();
        entries.sort_unstable();
        entries.dedup();

        let mut bytes = Vec::with_capacity(entries.len() * StateEntry::SIZE);
        for entry in &entries {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        let hash = utils::calculate_hash(&bytes);

        if let Some(block_nid) = self.db.block_nid_by_hash(&hash)? {
            return Ok(block_nid);
        }

        // Re-check under the mutex so two concurrent inserts of the same
        // content converge on one NID.
        let _lock = self.block_insert_mutex.lock().unwrap();
        if let Some(block_nid) = self.db.block_nid_by_hash(&hash)? {
            return Ok(block_nid);
        }
        let block_nid = services().globals.next_count(Sequence::StateBlock)?;
        self.db.insert_block(block_nid, &hash, &entries)?;
        Ok(block_nid)
    }

    /// Always allocates a fresh snapshot NID; the block list is stored
    /// sorted ascending.
    pub fn insert_snapshot(&self, room_nid: u64, mut block_nids: Vec<u64>) -> Result<u64> {
        block_nids.sort_unstable();
        block_nids.dedup();
        let snapshot_nid = services().globals.next_count(Sequence::StateSnapshot)?;
        self.db.insert_snapshot(snapshot_nid, room_nid, &block_nids)?;
        Ok(snapshot_nid)
    }

    /// Bulk block-list lookup, one result per requested snapshot, sorted by
    /// snapshot NID so callers can binary search.
    pub fn bulk_snapshot_blocks(&self, snapshot_nids: &[u64]) -> Result<Vec<(u64, Vec<u64>)>> {
        let mut nids = snapshot_nids.to_vec();
        nids.sort_unstable();
        nids.dedup();

        let mut results = Vec::with_capacity(nids.len());
        for nid in nids {
            let (_room_nid, blocks) = self
                .db
                .snapshot_blocks(nid)?
                .ok_or(Error::MissingSnapshot(nid))?;
            results.push((nid, blocks));
        }
        Ok(results)
    }

    /// Bulk entry lookup, one result per requested block, sorted by block
    /// NID.
    pub fn bulk_block_entries(&self, block_nids: &[u64]) -> Result<Vec<(u64, Vec<StateEntry>)>> {
        let mut nids = block_nids.to_vec();
        nids.sort_unstable();
        nids.dedup();

        let mut results = Vec::with_capacity(nids.len());
        for nid in nids {
            let entries = self
                .db
                .block_entries(nid)?
                .ok_or(Error::MissingBlock(nid))?;
            results.push((nid, entries));
        }
        Ok(results)
    }

    /// Overlay-evaluates a snapshot into the full `(type, state key) →
    /// event` map. Snapshot 0 is the empty state.
    pub fn materialize(&self, snapshot_nid: u64) -> Result<BTreeMap<(u64, u64), u64>> {
        let mut map = BTreeMap::new();
        if snapshot_nid == 0 {
            return Ok(map);
        }

        let (_room_nid, block_nids) = self
            .db
            .snapshot_blocks(snapshot_nid)?
            .ok_or(Error::MissingSnapshot(snapshot_nid))?;

        // Block NIDs are monotonic, so ascending list order is overlay
        // order: later blocks clobber earlier entries.
        for (_block_nid, entries) in self.bulk_block_entries(&block_nids)? {
            for entry in entries {
                map.insert(entry.tuple(), entry.event_nid);
            }
        }
        Ok(map)
    }

    /// New snapshot formed from a base snapshot's block list plus one delta
    /// block. Once the list exceeds the configured threshold it is merged
    /// into a single equivalent block.
    pub fn snapshot_with_block(
        &self,
        room_nid: u64,
        base_snapshot_nid: u64,
        block_nid: u64,
    ) -> Result<u64> {
        let mut block_nids = if base_snapshot_nid == 0 {
            Vec::new()
        } else {
            self.db
                .snapshot_blocks(base_snapshot_nid)?
                .ok_or(Error::MissingSnapshot(base_snapshot_nid))?
                .1
        };

        if !block_nids.contains(&block_nid) {
            block_nids.push(block_nid);
        }
        block_nids.sort_unstable();

        if block_nids.len() > services().globals.state_block_compaction_threshold() {
            let mut map = BTreeMap::new();
            for (_nid, entries) in self.bulk_block_entries(&block_nids)? {
                for entry in entries {
                    map.insert(entry.tuple(), entry.event_nid);
                }
            }
            let merged: Vec<StateEntry> = map
                .into_iter()
                .map(|((event_type_nid, state_key_nid), event_nid)| StateEntry {
                    event_type_nid,
                    state_key_nid,
                    event_nid,
                })
                .collect();
            let merged_nid = self.insert_block(&merged)?;
            block_nids = vec![merged_nid];
        }

        self.insert_snapshot(room_nid, block_nids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(type_nid: u64, key_nid: u64, event_nid: u64) -> StateEntry {
        StateEntry {
            event_type_nid: type_nid,
            state_key_nid: key_nid,
            event_nid,
        }
    }

    #[test]
    fn test_state_entry_byte_round_trip() {
        let original = entry(3, 7, 123_456);
        let bytes = original.to_bytes();
        assert_eq!(bytes.len(), StateEntry::SIZE);
        assert_eq!(StateEntry::from_bytes(&bytes).unwrap(), original);

        assert!(StateEntry::from_bytes(&bytes[1..]).is_err());
    }

    #[test]
    fn test_state_entry_orders_by_type_then_key() {
        let mut entries = vec![entry(2, 1, 9), entry(1, 2, 8), entry(1, 1, 7)];
        entries.sort_unstable();
        assert_eq!(
            entries,
            vec![entry(1, 1, 7), entry(1, 2, 8), entry(2, 1, 9)]
        );
    }

    #[test]
    fn test_state_entry_tuple() {
        assert_eq!(entry(4, 5, 6).tuple(), (4, 5));
    }
}
