// =============================================================================
// Conclave Federated Room Server - Region Data Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Storage contract for active regions: the per-room record of the
//   contiguous event graph this server tracks, with its frontier snapshot
//   and forward/backward tips.
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

use crate::Result;

/// The contiguous portion of a room's event graph held locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub region_nid: u64,
    pub room_nid: u64,
    /// Snapshot NID of the region's frontier state.
    pub state_nid: u64,
    /// Event NIDs with no known successors in-region, sorted ascending.
    pub forward: Vec<u64>,
    /// Event NIDs whose prev events are not all in-region, sorted
    /// ascending.
    pub backward: Vec<u64>,
}

pub trait Data: Send + Sync {
    /// The active region NID for a room, or `None` when the room was never
    /// activated by a join.
    fn active_region_nid(&self, room_nid: u64) -> Result<Option<u64>>;

    fn insert_new_active_region(&self, region: &Region) -> Result<()>;

    fn get_region(&self, region_nid: u64) -> Result<Option<Region>>;

    fn update_region(&self, region: &Region) -> Result<()>;
}
