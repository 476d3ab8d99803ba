// =============================================================================
// Conclave Federated Room Server - Region Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Active region management. A region is created when the first join
//   arrives for a room, grows forwards with new events and backwards with
//   backfill, and carries the frontier snapshot of the room's current
//   state. Tip updates happen under the region mutex.
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

pub use data::{Data, Region};
use tokio::sync::MutexGuard;
use tracing::debug;

use crate::{service::globals::Sequence, services, Error, Result};

pub struct Service {
    pub db: &'static dyn Data,
}

impl Service {
    pub fn active_region_nid(&self, room_nid: u64) -> Result<Option<u64>> {
        self.db.active_region_nid(room_nid)
    }

    pub fn get_region(&self, region_nid: u64) -> Result<Region> {
        self.db
            .get_region(region_nid)?
            .ok_or_else(|| Error::bad_database("active region record is missing"))
    }

    /// Creates the active region for a room from its first join event. The
    /// join becomes the sole forward tip; it is also a backward tip unless
    /// its prev events are all in-region already.
    #[tracing::instrument(skip(self))]
    pub fn create_region(
        &self,
        room_nid: u64,
        state_nid: u64,
        event_nid: u64,
        prevs_in_region: bool,
    ) -> Result<u64> {
        let region_nid = services().globals.next_count(Sequence::Region)?;
        let region = Region {
            region_nid,
            room_nid,
            state_nid,
            forward: vec![event_nid],
            backward: if prevs_in_region {
                Vec::new()
            } else {
                vec![event_nid]
            },
        };
        self.db.insert_new_active_region(&region)?;
        debug!("✅ Created region {} for room {}", region_nid, room_nid);
        Ok(region_nid)
    }

    /// Extends the region forwards with a new event: the referenced prev
    /// events stop being forward tips, the new event becomes one, and the
    /// frontier advances to the event's state-after snapshot. Returns
    /// whether the frontier actually moved.
    #[tracing::instrument(skip(self, _region_lock))]
    pub fn extend_forward(
        &self,
        region_nid: u64,
        event_nid: u64,
        prev_nids: &[u64],
        prevs_in_region: bool,
        state_after_nid: u64,
        _region_lock: &MutexGuard<'_, ()>,
    ) -> Result<bool> {
        let mut region = self.get_region(region_nid)?;

        region.forward.retain(|nid| !prev_nids.contains(nid));
        if let Err(position) = region.forward.binary_search(&event_nid) {
            region.forward.insert(position, event_nid);
        }
        if !prevs_in_region {
            // The event referenced something we do not have; it doubles as
            // a backward tip until backfill fills the gap.
            if let Err(position) = region.backward.binary_search(&event_nid) {
                region.backward.insert(position, event_nid);
            }
        }

        let changed = region.state_nid != state_after_nid;
        region.state_nid = state_after_nid;
        self.db.update_region(&region)?;
        Ok(changed)
    }

    /// Extends the region backwards with a backfilled event. Successor
    /// events whose prev events are now all in-region stop being backward
    /// tips; the backfilled event becomes one when its own prev events are
    /// still missing. The frontier does not move.
    #[tracing::instrument(skip(self, _region_lock))]
    pub fn extend_backward(
        &self,
        region_nid: u64,
        event_nid: u64,
        prevs_in_region: bool,
        resolved_successors: &[u64],
        _region_lock: &MutexGuard<'_, ()>,
    ) -> Result<()> {
        let mut region = self.get_region(region_nid)?;

        region
            .backward
            .retain(|nid| !resolved_successors.contains(nid));
        if !prevs_in_region {
            if let Err(position) = region.backward.binary_search(&event_nid) {
                region.backward.insert(position, event_nid);
            }
        }

        self.db.update_region(&region)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::RwLock,
    };
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MockRegionData {
        regions: RwLock<HashMap<u64, Region>>,
        active: RwLock<HashMap<u64, u64>>,
    }

    impl Data for MockRegionData {
        fn active_region_nid(&self, room_nid: u64) -> Result<Option<u64>> {
            Ok(self.active.read().unwrap().get(&room_nid).copied())
        }

        fn insert_new_active_region(&self, region: &Region) -> Result<()> {
            self.active
                .write()
                .unwrap()
                .insert(region.room_nid, region.region_nid);
            self.regions
                .write()
                .unwrap()
                .insert(region.region_nid, region.clone());
            Ok(())
        }

        fn get_region(&self, region_nid: u64) -> Result<Option<Region>> {
            Ok(self.regions.read().unwrap().get(&region_nid).cloned())
        }

        fn update_region(&self, region: &Region) -> Result<()> {
            self.regions
                .write()
                .unwrap()
                .insert(region.region_nid, region.clone());
            Ok(())
        }
    }

    fn service_with(region: Region) -> Service {
        let data = MockRegionData::default();
        data.insert_new_active_region(&region).unwrap();
        Service {
            db: Box::leak(Box::new(data)),
        }
    }

    #[test]
    fn test_extend_forward_swaps_tips_and_moves_frontier() {
        let service = service_with(Region {
            region_nid: 1,
            room_nid: 1,
            state_nid: 10,
            forward: vec![5],
            backward: vec![5],
        });

        let mutex = Mutex::new(());
        let lock = mutex.try_lock().unwrap();
        let changed = service.extend_forward(1, 6, &[5], true, 11, &lock).unwrap();
        assert!(changed);

        let region = service.get_region(1).unwrap();
        assert_eq!(region.forward, vec![6]);
        assert_eq!(region.state_nid, 11);
        assert_eq!(region.backward, vec![5], "backward tips untouched");
    }

    #[test]
    fn test_extend_forward_keeps_unreferenced_tips() {
        // Two concurrent children of different tips: the unreferenced tip
        // stays, so the forward tips remain pairwise non-ancestor.
        let service = service_with(Region {
            region_nid: 1,
            room_nid: 1,
            state_nid: 10,
            forward: vec![5, 6],
            backward: vec![],
        });

        let mutex = Mutex::new(());
        let lock = mutex.try_lock().unwrap();
        service.extend_forward(1, 7, &[5], true, 12, &lock).unwrap();

        let region = service.get_region(1).unwrap();
        assert_eq!(region.forward, vec![6, 7]);
    }

    #[test]
    fn test_extend_forward_with_missing_prevs_adds_backward_tip() {
        let service = service_with(Region {
            region_nid: 1,
            room_nid: 1,
            state_nid: 10,
            forward: vec![5],
            backward: vec![],
        });

        let mutex = Mutex::new(());
        let lock = mutex.try_lock().unwrap();
        service
            .extend_forward(1, 9, &[5], false, 13, &lock)
            .unwrap();

        let region = service.get_region(1).unwrap();
        assert_eq!(region.forward, vec![9]);
        assert_eq!(region.backward, vec![9]);
    }

    #[test]
    fn test_extend_backward_resolves_successors() {
        let service = service_with(Region {
            region_nid: 1,
            room_nid: 1,
            state_nid: 10,
            forward: vec![8],
            backward: vec![7],
        });

        let mutex = Mutex::new(());
        let lock = mutex.try_lock().unwrap();
        // Backfilled event 4 fills the gap below tip 7; its own prevs are
        // still missing so it takes 7's place as the backward tip.
        service.extend_backward(1, 4, false, &[7], &lock).unwrap();

        let region = service.get_region(1).unwrap();
        assert_eq!(region.backward, vec![4]);
        assert_eq!(region.forward, vec![8], "forward tips untouched");
        assert_eq!(region.state_nid, 10, "frontier untouched");
    }
}
