// =============================================================================
// Conclave Federated Room Server - Key Value Region Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Active region records: room NID, frontier snapshot and the two sorted
//   tip lists in one length-prefixed value.
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
    service::{self, rooms::region::Region},
    utils, Error, Result,
};

fn region_to_bytes(region: &Region) -> Vec<u8> {
    let mut value = Vec::with_capacity(
        (3 + region.forward.len() + region.backward.len()) * size_of::<u64>(),
    );
    value.extend_from_slice(&region.room_nid.to_be_bytes());
    value.extend_from_slice(&region.state_nid.to_be_bytes());
    value.extend_from_slice(&(region.forward.len() as u64).to_be_bytes());
    for nid in &region.forward {
        value.extend_from_slice(&nid.to_be_bytes());
    }
    for nid in &region.backward {
        value.extend_from_slice(&nid.to_be_bytes());
    }
    value
}

fn region_from_bytes(region_nid: u64, bytes: &[u8]) -> Result<Region> {
    if bytes.len() < 3 * size_of::<u64>() || bytes.len() % size_of::<u64>() != 0 {
        return Err(Error::bad_database("region record has wrong length"));
    }
    let room_nid = utils::u64_from_bytes(&bytes[0..8]).expect("slice has the right length");
    let state_nid = utils::u64_from_bytes(&bytes[8..16]).expect("slice has the right length");
    let forward_len =
        utils::u64_from_bytes(&bytes[16..24]).expect("slice has the right length") as usize;

    let nids: Vec<u64> = bytes[24..]
        .chunks_exact(size_of::<u64>())
        .map(|chunk| utils::u64_from_bytes(chunk).expect("chunk has the right length"))
        .collect();
    if forward_len > nids.len() {
        return Err(Error::bad_database("region record has wrong tip count"));
    }
    let (forward, backward) = nids.split_at(forward_len);

    Ok(Region {
        region_nid,
        room_nid,
        state_nid,
        forward: forward.to_vec(),
        backward: backward.to_vec(),
    })
}

impl service::rooms::region::Data for KeyValueDatabase {
    fn active_region_nid(&self, room_nid: u64) -> Result<Option<u64>> {
        self.roomnid_regionnid
            .get(&room_nid.to_be_bytes())?
            .map(|bytes| {
                utils::u64_from_bytes(&bytes)
                    .map_err(|_| Error::bad_database("region NID has invalid bytes"))
            })
            .transpose()
    }

    fn insert_new_active_region(&self, region: &Region) -> Result<()> {
        self.roomnid_regionnid.insert(
            &region.room_nid.to_be_bytes(),
            &region.region_nid.to_be_bytes(),
        )?;
        self.regionnid_region
            .insert(&region.region_nid.to_be_bytes(), &region_to_bytes(region))
    }

    fn get_region(&self, region_nid: u64) -> Result<Option<Region>> {
        self.regionnid_region
            .get(&region_nid.to_be_bytes())?
            .map(|bytes| region_from_bytes(region_nid, &bytes))
            .transpose()
    }

    fn update_region(&self, region: &Region) -> Result<()> {
        self.regionnid_region
            .insert(&region.region_nid.to_be_bytes(), &region_to_bytes(region))
    }
}
