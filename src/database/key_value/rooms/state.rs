// =============================================================================
// Conclave Federated Room Server - Key Value State Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   State blocks and snapshots: entry lists as fixed-width concatenated
//   records, snapshots as room NID plus sorted block NID lists, and the
//   content-address index keyed by entry hash.
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

use std::mem::size_of;

use crate::{
    database::KeyValueDatabase,
    service::{self, rooms::state::StateEntry},
    utils, Error, Result,
};

impl service::rooms::state::Data for KeyValueDatabase {
    fn block_nid_by_hash(&self, hash: &str) -> Result<Option<u64>> {
        self.statehash_blocknid
            .get(hash.as_bytes())?
            .map(|bytes| {
                utils::u64_from_bytes(&bytes)
                    .map_err(|_| Error::bad_database("block NID has invalid bytes"))
            })
            .transpose()
    }

    fn insert_block(&self, block_nid: u64, hash: &str, entries: &[StateEntry]) -> Result<()> {
        let mut value = Vec::with_capacity(entries.len() * StateEntry::SIZE);
        for entry in entries {
            value.extend_from_slice(&entry.to_bytes());
        }
        self.blocknid_entries
            .insert(&block_nid.to_be_bytes(), &value)?;
        self.statehash_blocknid
            .insert(hash.as_bytes(), &block_nid.to_be_bytes())
    }

    fn block_entries(&self, block_nid: u64) -> Result<Option<Vec<StateEntry>>> {
        let Some(bytes) = self.blocknid_entries.get(&block_nid.to_be_bytes())? else {
            return Ok(None);
        };
        if bytes.len() % StateEntry::SIZE != 0 {
            return Err(Error::bad_database("state block has wrong length"));
        }
        let entries = bytes
            .chunks_exact(StateEntry::SIZE)
            .map(StateEntry::from_bytes)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(entries))
    }

    fn insert_snapshot(&self, snapshot_nid: u64, room_nid: u64, block_nids: &[u64]) -> Result<()> {
        let mut value = Vec::with_capacity((1 + block_nids.len()) * size_of::<u64>());
        value.extend_from_slice(&room_nid.to_be_bytes());
        for block_nid in block_nids {
            value.extend_from_slice(&block_nid.to_be_bytes());
        }
        self.snapshotnid_blocks
            .insert(&snapshot_nid.to_be_bytes(), &value)
    }

    fn snapshot_blocks(&self, snapshot_nid: u64) -> Result<Option<(u64, Vec<u64>)>> {
        let Some(bytes) = self.snapshotnid_blocks.get(&snapshot_nid.to_be_bytes())? else {
            return Ok(None);
        };
        if bytes.len() < size_of::<u64>() || bytes.len() % size_of::<u64>() != 0 {
            return Err(Error::bad_database("state snapshot has wrong length"));
        }
        let room_nid = utils::u64_from_bytes(&bytes[0..8]).expect("slice has the right length");
        let block_nids = bytes[8..]
            .chunks_exact(size_of::<u64>())
            .map(|chunk| utils::u64_from_bytes(chunk).expect("chunk has the right length"))
            .collect();
        Ok(Some((room_nid, block_nids)))
    }
}
