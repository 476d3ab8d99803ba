// =============================================================================
// Conclave Federated Room Server - State Resolver Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Deterministic state conflict resolution. When an event's predecessors
//   disagree about the room state, the conflicting tuples are re-decided
//   by running the authorization rules against the partially resolved
//   state, taking candidates in depth-descending, hash-ascending order.
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

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use ruma::events::TimelineEventType;
use tracing::debug;

use crate::{
    service::{
        auth::{self, AuthEvents},
        pdu::PduEvent,
        rooms::{state::StateEntry, timeline::StateAtEvent},
    },
    services, utils, Error, Result,
};

pub struct Service;

impl Service {
    /// Computes the state before an event from the state at its prev
    /// events. With a single distinct after-snapshot this is a plain
    /// reuse; otherwise the candidate snapshots are resolved into a new
    /// one. Deterministic given the same inputs and event store contents.
    #[tracing::instrument(skip(self, state_at_prev))]
    pub async fn resolve(
        &self,
        room_nid: u64,
        state_at_prev: &[(u64, StateAtEvent)],
    ) -> Result<u64> {
        if state_at_prev.is_empty() {
            return Ok(0);
        }

        let mut snapshot_nids: Vec<u64> = state_at_prev
            .iter()
            .map(|(_, state)| state.after_state_nid)
            .collect();
        snapshot_nids.sort_unstable();
        snapshot_nids.dedup();
        if snapshot_nids.len() == 1 {
            return Ok(snapshot_nids[0]);
        }

        debug!("🔧 Resolving {} candidate snapshots", snapshot_nids.len());

        // Materialize every candidate snapshot from two bulk reads; the
        // results come back sorted by NID, so block lookups are binary
        // searches.
        let block_lists = services().rooms.state.bulk_snapshot_blocks(&snapshot_nids)?;
        let all_blocks: Vec<u64> = block_lists
            .iter()
            .flat_map(|(_, blocks)| blocks.iter().copied())
            .collect();
        let entry_lists = services().rooms.state.bulk_block_entries(&all_blocks)?;

        let mut candidates = Vec::with_capacity(block_lists.len());
        for (_snapshot_nid, block_nids) in &block_lists {
            let mut map = BTreeMap::new();
            for block_nid in block_nids {
                let position = entry_lists
                    .binary_search_by_key(block_nid, |(nid, _)| *nid)
                    .map_err(|_| Error::MissingBlock(*block_nid))?;
                for entry in &entry_lists[position].1 {
                    map.insert(entry.tuple(), entry.event_nid);
                }
            }
            candidates.push(map);
        }

        // Tuples mapping to the same event in every candidate are
        // unconflicted; everything else carries its candidate set into the
        // ordered resolution passes.
        let mut all_tuples: BTreeSet<(u64, u64)> = BTreeSet::new();
        for map in &candidates {
            all_tuples.extend(map.keys().copied());
        }

        let mut resolved: BTreeMap<(u64, u64), u64> = BTreeMap::new();
        let mut conflicted: BTreeMap<(u64, u64), Vec<u64>> = BTreeMap::new();
        for tuple in all_tuples {
            let mut values: Vec<Option<u64>> =
                candidates.iter().map(|map| map.get(&tuple).copied()).collect();
            values.sort_unstable();
            values.dedup();
            if values.len() == 1 {
                if let Some(event_nid) = values[0] {
                    resolved.insert(tuple, event_nid);
                }
            } else {
                conflicted.insert(tuple, values.into_iter().flatten().collect());
            }
        }

        if conflicted.is_empty() {
            return self.snapshot_from_map(room_nid, &resolved);
        }

        // The auth chains of the conflicted events supply auth lookups for
        // tuples that are not resolved yet. The candidates themselves are
        // excluded so no event can authorize itself.
        let mut conflicted_nids: Vec<u64> = conflicted.values().flatten().copied().collect();
        conflicted_nids.sort_unstable();
        conflicted_nids.dedup();

        let mut chain: HashSet<u64> = services()
            .rooms
            .auth_chain
            .get_auth_chain(&conflicted_nids)
            .await?;
        for nid in &conflicted_nids {
            chain.remove(nid);
        }

        let mut auth_pool: HashMap<(u64, u64), Vec<u64>> = HashMap::new();
        for &event_nid in &chain {
            let Some(meta) = services().rooms.timeline.event_meta(event_nid)? else {
                continue;
            };
            if let Some(state_key_nid) = meta.state_key_nid {
                auth_pool
                    .entry((meta.event_type_nid, state_key_nid))
                    .or_default()
                    .push(event_nid);
            }
        }
        for pool in auth_pool.values_mut() {
            *pool = self.order_candidates(pool)?;
        }

        // Resolution passes: power levels first, join rules second,
        // memberships by ascending target user id third, everything else
        // in lexicographic tuple order last.
        let power_levels_nid = services()
            .rooms
            .short
            .get_eventtype_nid(&TimelineEventType::RoomPowerLevels)?;
        let join_rules_nid = services()
            .rooms
            .short
            .get_eventtype_nid(&TimelineEventType::RoomJoinRules)?;
        let member_nid = services()
            .rooms
            .short
            .get_eventtype_nid(&TimelineEventType::RoomMember)?;

        let mut power_levels_tuples = Vec::new();
        let mut join_rules_tuples = Vec::new();
        let mut member_tuples = Vec::new();
        let mut other_tuples = Vec::new();
        for &tuple in conflicted.keys() {
            if Some(tuple.0) == power_levels_nid {
                power_levels_tuples.push(tuple);
            } else if Some(tuple.0) == join_rules_nid {
                join_rules_tuples.push(tuple);
            } else if Some(tuple.0) == member_nid {
                let target = services().rooms.short.get_statekey_from_nid(tuple.1)?;
                member_tuples.push((target, tuple));
            } else {
                let event_type = services()
                    .rooms
                    .short
                    .get_eventtype_from_nid(tuple.0)?
                    .to_string();
                let state_key = services().rooms.short.get_statekey_from_nid(tuple.1)?;
                other_tuples.push(((event_type, state_key), tuple));
            }
        }
        member_tuples.sort();
        other_tuples.sort();

        let ordered: Vec<(u64, u64)> = power_levels_tuples
            .into_iter()
            .chain(join_rules_tuples)
            .chain(member_tuples.into_iter().map(|(_, tuple)| tuple))
            .chain(other_tuples.into_iter().map(|(_, tuple)| tuple))
            .collect();

        for tuple in ordered {
            let candidates = self.order_candidates(&conflicted[&tuple])?;
            let mut winner = None;
            for event_nid in candidates {
                let Some(pdu) = services().rooms.timeline.get_pdu(event_nid)? else {
                    continue;
                };
                let view = ResolutionAuthEvents {
                    resolved: &resolved,
                    pool: &auth_pool,
                };
                if auth::allowed(&pdu, &view).is_ok() {
                    winner = Some(event_nid);
                    break;
                }
            }
            match winner {
                Some(event_nid) => {
                    resolved.insert(tuple, event_nid);
                }
                None => {
                    debug!("🔧 No candidate for tuple {:?} passed auth, dropping it", tuple);
                }
            }
        }

        self.snapshot_from_map(room_nid, &resolved)
    }

    /// Orders candidate events by depth descending, then by the SHA-256 of
    /// their event id ascending.
    fn order_candidates(&self, event_nids: &[u64]) -> Result<Vec<u64>> {
        let mut keyed = Vec::with_capacity(event_nids.len());
        for &event_nid in event_nids {
            let meta = services()
                .rooms
                .timeline
                .event_meta(event_nid)?
                .ok_or_else(|| Error::bad_database("conflicted event has no metadata"))?;
            let event_id = services().rooms.short.get_eventid_from_nid(event_nid)?;
            let hash = utils::calculate_hash(event_id.as_bytes());
            keyed.push((Reverse(meta.depth), hash, event_nid));
        }
        keyed.sort();
        Ok(keyed.into_iter().map(|(_, _, nid)| nid).collect())
    }

    fn snapshot_from_map(&self, room_nid: u64, map: &BTreeMap<(u64, u64), u64>) -> Result<u64> {
        let entries: Vec<StateEntry> = map
            .iter()
            .map(|(&(event_type_nid, state_key_nid), &event_nid)| StateEntry {
                event_type_nid,
                state_key_nid,
                event_nid,
            })
            .collect();
        let block_nid = services().rooms.state.insert_block(&entries)?;
        services().rooms.state.insert_snapshot(room_nid, vec![block_nid])
    }
}

/// Auth event lookups during resolution: the partially resolved state
/// first, then the auth chains of the conflicted events.
struct ResolutionAuthEvents<'a> {
    resolved: &'a BTreeMap<(u64, u64), u64>,
    pool: &'a HashMap<(u64, u64), Vec<u64>>,
}

impl ResolutionAuthEvents<'_> {
    fn lookup(
        &self,
        event_type: &TimelineEventType,
        state_key: &str,
    ) -> Result<Option<Arc<PduEvent>>> {
        let Some(type_nid) = services().rooms.short.get_eventtype_nid(event_type)? else {
            return Ok(None);
        };
        let Some(key_nid) = services().rooms.short.get_statekey_nid(state_key)? else {
            return Ok(None);
        };
        let tuple = (type_nid, key_nid);

        if let Some(&event_nid) = self.resolved.get(&tuple) {
            return services().rooms.timeline.get_pdu(event_nid);
        }
        if let Some(pool) = self.pool.get(&tuple) {
            if let Some(&event_nid) = pool.first() {
                return services().rooms.timeline.get_pdu(event_nid);
            }
        }
        Ok(None)
    }
}

impl AuthEvents for ResolutionAuthEvents<'_> {
    fn create(&self) -> Result<Option<Arc<PduEvent>>> {
        self.lookup(&TimelineEventType::RoomCreate, "")
    }

    fn join_rules(&self) -> Result<Option<Arc<PduEvent>>> {
        self.lookup(&TimelineEventType::RoomJoinRules, "")
    }

    fn power_levels(&self) -> Result<Option<Arc<PduEvent>>> {
        self.lookup(&TimelineEventType::RoomPowerLevels, "")
    }

    fn member(&self, state_key: &str) -> Result<Option<Arc<PduEvent>>> {
        self.lookup(&TimelineEventType::RoomMember, state_key)
    }

    fn third_party_invite(&self, state_key: &str) -> Result<Option<Arc<PduEvent>>> {
        self.lookup(&TimelineEventType::RoomThirdPartyInvite, state_key)
    }
}
