// =============================================================================
// Conclave Federated Room Server - State Data Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Storage contract for state blocks and snapshots. Blocks are immutable
//   content-addressed entry sets; snapshots are ascending lists of block
//   NIDs whose overlay yields the room state.
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

use super::StateEntry;
use crate::Result;

pub trait Data: Send + Sync {
    /// Content-addressed block lookup by the hash of its sorted entries.
    fn block_nid_by_hash(&self, hash: &str) -> Result<Option<u64>>;

    fn insert_block(&self, block_nid: u64, hash: &str, entries: &[StateEntry]) -> Result<()>;

    fn block_entries(&self, block_nid: u64) -> Result<Option<Vec<StateEntry>>>;

    fn insert_snapshot(&self, snapshot_nid: u64, room_nid: u64, block_nids: &[u64]) -> Result<()>;

    /// Returns `(room_nid, block_nids)` with the block list sorted
    /// ascending as stored.
    fn snapshot_blocks(&self, snapshot_nid: u64) -> Result<Option<(u64, Vec<u64>)>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::{Arc, RwLock},
    };

    /// Mock implementation of the Data trait for testing
    #[derive(Debug, Default)]
    struct MockStateData {
        blocks: Arc<RwLock<HashMap<u64, Vec<StateEntry>>>>,
        hashes: Arc<RwLock<HashMap<String, u64>>>,
        snapshots: Arc<RwLock<HashMap<u64, (u64, Vec<u64>)>>>,
    }

    impl Data for MockStateData {
        fn block_nid_by_hash(&self, hash: &str) -> Result<Option<u64>> {
            Ok(self.hashes.read().unwrap().get(hash).copied())
        }

        fn insert_block(&self, block_nid: u64, hash: &str, entries: &[StateEntry]) -> Result<()> {
            self.blocks
                .write()
                .unwrap()
                .insert(block_nid, entries.to_vec());
            self.hashes
                .write()
                .unwrap()
                .insert(hash.to_owned(), block_nid);
            Ok(())
        }

        fn block_entries(&self, block_nid: u64) -> Result<Option<Vec<StateEntry>>> {
            Ok(self.blocks.read().unwrap().get(&block_nid).cloned())
        }

        fn insert_snapshot(
            &self,
            snapshot_nid: u64,
            room_nid: u64,
            block_nids: &[u64],
        ) -> Result<()> {
            self.snapshots
                .write()
                .unwrap()
                .insert(snapshot_nid, (room_nid, block_nids.to_vec()));
            Ok(())
        }

        fn snapshot_blocks(&self, snapshot_nid: u64) -> Result<Option<(u64, Vec<u64>)>> {
            Ok(self.snapshots.read().unwrap().get(&snapshot_nid).cloned())
        }
    }

    fn entry(type_nid: u64, key_nid: u64, event_nid: u64) -> StateEntry {
        StateEntry {
            event_type_nid: type_nid,
            state_key_nid: key_nid,
            event_nid,
        }
    }

    #[test]
    fn test_block_round_trip() {
        let data = MockStateData::default();
        let entries = vec![entry(1, 1, 10), entry(2, 3, 11)];

        data.insert_block(1, "hash-a", &entries).unwrap();
        assert_eq!(data.block_nid_by_hash("hash-a").unwrap(), Some(1));
        assert_eq!(data.block_entries(1).unwrap().unwrap(), entries);
        assert_eq!(data.block_entries(2).unwrap(), None);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let data = MockStateData::default();
        data.insert_snapshot(5, 1, &[1, 2, 3]).unwrap();

        let (room_nid, blocks) = data.snapshot_blocks(5).unwrap().unwrap();
        assert_eq!(room_nid, 1);
        assert_eq!(blocks, vec![1, 2, 3]);
        assert_eq!(data.snapshot_blocks(6).unwrap(), None);
    }
}
