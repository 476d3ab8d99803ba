// =============================================================================
// Conclave Federated Room Server - Event Handler Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   The room input pipeline. Each inbound event is parsed, pre-validated,
//   interned, authorized against the state before it, given its state
//   snapshots and folded into the room's active region, all under the
//   per-room mutex. Every processed input emits one output record.
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

use std::{collections::HashSet, sync::Arc};

use ruma::OwnedEventId;
use tracing::{debug, warn};

use crate::{
    api::{EventKind, InputEvent, InputPurgeHistory, InputRedact, OutputEvent},
    service::{
        auth::{self, AuthEventMap},
        globals::Sequence,
        pdu::PduEvent,
        rooms::{
            state::StateEntry,
            timeline::{EventMeta, StateAtEvent},
        },
    },
    services, Error, Result,
};

pub struct Service;

impl Service {
    /// Processes one input event. Returns the emitted output record, or
    /// `None` when the event was already known and the input is a
    /// duplicate.
    ///
    /// Lock order is create → activate → region; acquiring them in any
    /// other order elsewhere would deadlock against this pipeline.
    #[tracing::instrument(skip(self, input))]
    pub async fn handle(&self, input: InputEvent) -> Result<Option<OutputEvent>> {
        let pdu = PduEvent::parse(&input.event)?;

        let mut prev_ids: Vec<OwnedEventId> =
            pdu.prev_events.iter().map(|r| r.event_id.clone()).collect();
        prev_ids.sort_unstable();
        prev_ids.dedup();

        // 1. Pre-validate: the state named by the input, or the state at
        //    every prev event, must already be persisted. Outliers carry no
        //    state at all; they are exactly the events loaded before any
        //    state exists.
        let mut supplied_state: Option<Vec<StateEntry>> = None;
        let mut state_at_prev: Vec<(u64, StateAtEvent)> = Vec::new();
        if input.kind != EventKind::Outlier {
            if let Some(state_ids) = &input.state {
                supplied_state = Some(services().rooms.timeline.state_entries_for(state_ids)?);
            } else {
                state_at_prev = services().rooms.timeline.state_at_events(&prev_ids)?;
            }
        }

        // 2. Room lookup, creating the room under the create lock when its
        //    first outlier arrives.
        let room_nid = self.prepare_room(input.kind, &pdu).await?;

        // Everything below happens under the per-room mutex; rooms stay
        // fully parallel to each other.
        let mutex_activate = Arc::clone(
            services()
                .globals
                .roomnid_mutex_activate
                .write()
                .await
                .entry(room_nid)
                .or_default(),
        );
        let state_lock = mutex_activate.lock().await;

        // Depth must grow along graph edges. Prev events referenced before
        // their bodies arrive keep a reserved NID so the reference edges
        // survive until backfill delivers them.
        let depth = u64::from(pdu.depth);
        let (prev_nids, _) = services().rooms.short.assign_event_nids(&prev_ids)?;
        let mut prevs_in_region = true;
        for &prev_nid in &prev_nids {
            match services().rooms.timeline.event_meta(prev_nid)? {
                Some(prev_meta) => {
                    if prev_meta.depth >= depth {
                        return Err(Error::InvalidEvent(format!(
                            "depth {} of {} is not greater than prev event depth {}",
                            depth, pdu.event_id, prev_meta.depth
                        )));
                    }
                    if services().rooms.timeline.state_at(prev_nid)?.is_none() {
                        prevs_in_region = false;
                    }
                }
                None => prevs_in_region = false,
            }
        }

        // 3. Intern and persist. An already-stored body means a duplicate
        //    submission, acknowledged without a second output record.
        let (event_nids, _) = services()
            .rooms
            .short
            .assign_event_nids(&[pdu.event_id.clone()])?;
        let event_nid = event_nids[0];
        if services().rooms.timeline.event_meta(event_nid)?.is_some() {
            debug!("🔁 Duplicate event {}", pdu.event_id);
            return Ok(None);
        }

        let event_type_nid = services()
            .rooms
            .short
            .get_or_create_eventtype_nid(&pdu.kind)?;
        let state_key_nid = match &pdu.state_key {
            Some(state_key) => Some(
                services()
                    .rooms
                    .short
                    .get_or_create_statekey_nid(state_key)?,
            ),
            None => None,
        };
        let own_entry = state_key_nid.map(|state_key_nid| StateEntry {
            event_type_nid,
            state_key_nid,
            event_nid,
        });

        let meta = EventMeta {
            room_nid,
            depth,
            kind: input.kind,
            event_type_nid,
            state_key_nid,
            rejected: false,
            redacted: false,
        };
        services().rooms.timeline.insert_event(event_nid, &meta, &pdu)?;
        services()
            .rooms
            .timeline
            .mark_as_referenced(event_nid, &prev_nids)?;

        // 4. Outlier fast path: no state and no region work. Events whose
        //    auth set is empty (the create event) still get checked so a
        //    bad create is recorded as rejected instead of stored silently.
        if input.kind == EventKind::Outlier {
            let needed = auth::state_needed_for_auth(&[&pdu]);
            let mut rejected = false;
            let mut reject_reason = None;
            if needed.is_empty() {
                if let Err(error) = auth::allowed(&pdu, &AuthEventMap::new()) {
                    if !error.is_rejection() {
                        return Err(error);
                    }
                    warn!("🚫 Rejected outlier {}: {}", pdu.event_id, error);
                    services()
                        .rooms
                        .timeline
                        .set_rejected(event_nid, &error.to_string())?;
                    rejected = true;
                    reject_reason = Some(error.to_string());
                }
            }

            let output = OutputEvent {
                event_nid,
                event_id: pdu.event_id.clone(),
                room_nid,
                kind: input.kind,
                state_before_nid: 0,
                state_after_nid: 0,
                current_state_changed: false,
                rejected,
                reject_reason,
            };
            services().rooms.output.append(&output)?;
            return Ok(Some(output));
        }

        // 5. State before the event: a block built from the supplied state
        //    on top of the frontier, the shared after-state of the prev
        //    events, or a resolver run when they disagree.
        let state_before_nid = if let Some(entries) = supplied_state {
            let block_nid = services().rooms.state.insert_block(&entries)?;
            let frontier = match services().rooms.region.active_region_nid(room_nid)? {
                Some(region_nid) => services().rooms.region.get_region(region_nid)?.state_nid,
                None => 0,
            };
            services()
                .rooms
                .state
                .snapshot_with_block(room_nid, frontier, block_nid)?
        } else {
            services()
                .rooms
                .state_resolver
                .resolve(room_nid, &state_at_prev)
                .await?
        };

        // 6. Authorization against the state before the event. A rejection
        //    is recorded and emitted; the region and frontier stay as they
        //    were.
        let needed = auth::state_needed_for_auth(&[&pdu]);
        let auth_view = self.auth_events_at(state_before_nid, &needed)?;
        if let Err(error) = auth::allowed(&pdu, &auth_view) {
            if !error.is_rejection() {
                return Err(error);
            }
            warn!("🚫 Rejected event {}: {}", pdu.event_id, error);
            services()
                .rooms
                .timeline
                .set_rejected(event_nid, &error.to_string())?;

            let output = OutputEvent {
                event_nid,
                event_id: pdu.event_id.clone(),
                room_nid,
                kind: input.kind,
                state_before_nid,
                state_after_nid: state_before_nid,
                current_state_changed: false,
                rejected: true,
                reject_reason: Some(error.to_string()),
            };
            services().rooms.output.append(&output)?;
            return Ok(Some(output));
        }

        // 7. The state after a state event differs from the state before
        //    it only at the event's own tuple.
        let state_after_nid = match own_entry {
            Some(entry) => {
                let block_nid = services().rooms.state.insert_block(&[entry])?;
                services()
                    .rooms
                    .state
                    .snapshot_with_block(room_nid, state_before_nid, block_nid)?
            }
            None => state_before_nid,
        };
        services().rooms.timeline.set_state_at(
            event_nid,
            &StateAtEvent {
                before_state_nid: state_before_nid,
                after_state_nid: state_after_nid,
                entry: own_entry,
            },
        )?;

        // 8. Fold the event into the active region.
        let current_state_changed = self
            .update_region(
                input.kind,
                room_nid,
                event_nid,
                &prev_nids,
                prevs_in_region,
                state_after_nid,
            )
            .await?;

        // 9. Emit the output record while still holding the room lock, so
        //    per-room output order matches lock release order.
        let output = OutputEvent {
            event_nid,
            event_id: pdu.event_id.clone(),
            room_nid,
            kind: input.kind,
            state_before_nid,
            state_after_nid,
            current_state_changed,
            rejected: false,
            reject_reason: None,
        };
        services().rooms.output.append(&output)?;

        drop(state_lock);
        Ok(Some(output))
    }

    /// Removes in-region history up to the given depth, preserving the
    /// current state and the region tips. Returns the number of purged
    /// events.
    #[tracing::instrument(skip(self))]
    pub async fn purge_history(&self, input: InputPurgeHistory) -> Result<usize> {
        let Some(room_nid) = services().rooms.short.get_roomnid(&input.room_id)? else {
            warn!("⚠️ History purge for unknown room {}", input.room_id);
            return Ok(0);
        };

        let mutex_activate = Arc::clone(
            services()
                .globals
                .roomnid_mutex_activate
                .write()
                .await
                .entry(room_nid)
                .or_default(),
        );
        let _state_lock = mutex_activate.lock().await;

        let mut keep: HashSet<u64> = HashSet::new();
        if let Some(region_nid) = services().rooms.region.active_region_nid(room_nid)? {
            let region = services().rooms.region.get_region(region_nid)?;
            keep.extend(region.forward.iter().copied());
            keep.extend(region.backward.iter().copied());
            for (_tuple, event_nid) in services().rooms.state.materialize(region.state_nid)? {
                keep.insert(event_nid);
            }
        }

        services()
            .rooms
            .timeline
            .purge_history(room_nid, input.depth, &keep)
    }

    /// Records a redaction intent against each event. Content stripping
    /// happens when the events are read back, never in storage.
    #[tracing::instrument(skip(self))]
    pub async fn redact(&self, input: InputRedact) -> Result<()> {
        for event_id in &input.event_ids {
            match services().rooms.short.get_eventnid(event_id)? {
                Some(event_nid) => services().rooms.timeline.set_redacted(event_nid)?,
                None => warn!("⚠️ Redaction for unknown event {}", event_id),
            }
        }
        Ok(())
    }

    /// Looks the room up without a lock; the first events of an unknown
    /// room must be outliers, and creation is double-checked under the
    /// create mutex.
    async fn prepare_room(&self, kind: EventKind, pdu: &PduEvent) -> Result<u64> {
        if let Some(room_nid) = services().rooms.short.get_roomnid(&pdu.room_id)? {
            return Ok(room_nid);
        }
        if kind != EventKind::Outlier {
            return Err(Error::MissingState(format!(
                "the first events added to a room must be outliers: {}",
                pdu.room_id
            )));
        }

        let mutex_create = Arc::clone(
            services()
                .globals
                .roomid_mutex_create
                .write()
                .await
                .entry(pdu.room_id.clone())
                .or_default(),
        );
        let _create_lock = mutex_create.lock().await;

        if let Some(room_nid) = services().rooms.short.get_roomnid(&pdu.room_id)? {
            return Ok(room_nid);
        }
        let room_nid = services().globals.next_count(Sequence::Room)?;
        services()
            .rooms
            .short
            .insert_new_room(room_nid, &pdu.room_id)?;
        debug!("✅ Created room {} as {}", pdu.room_id, room_nid);
        Ok(room_nid)
    }

    /// Builds the auth events view for one event from a materialized
    /// snapshot, loading only the events its auth set names.
    fn auth_events_at(&self, snapshot_nid: u64, needed: &auth::StateNeeded) -> Result<AuthEventMap> {
        let mut map = AuthEventMap::new();
        if needed.is_empty() {
            return Ok(map);
        }

        let state = services().rooms.state.materialize(snapshot_nid)?;
        for (event_type, state_key) in needed.tuples() {
            let Some(type_nid) = services().rooms.short.get_eventtype_nid(&event_type)? else {
                continue;
            };
            let Some(key_nid) = services().rooms.short.get_statekey_nid(&state_key)? else {
                continue;
            };
            let Some(&event_nid) = state.get(&(type_nid, key_nid)) else {
                continue;
            };
            let Some(pdu) = services().rooms.timeline.get_pdu(event_nid)? else {
                return Err(Error::bad_database("state entry points at a missing event"));
            };
            map.insert(pdu)?;
        }
        Ok(map)
    }

    async fn update_region(
        &self,
        kind: EventKind,
        room_nid: u64,
        event_nid: u64,
        prev_nids: &[u64],
        prevs_in_region: bool,
        state_after_nid: u64,
    ) -> Result<bool> {
        let active = services().rooms.region.active_region_nid(room_nid)?;

        match (kind, active) {
            (EventKind::Join, None) => {
                services().rooms.region.create_region(
                    room_nid,
                    state_after_nid,
                    event_nid,
                    prevs_in_region,
                )?;
                Ok(true)
            }
            (EventKind::Join | EventKind::New, Some(region_nid)) => {
                let mutex_region = Arc::clone(
                    services()
                        .globals
                        .regionnid_mutex
                        .write()
                        .await
                        .entry(region_nid)
                        .or_default(),
                );
                let region_lock = mutex_region.lock().await;
                services().rooms.region.extend_forward(
                    region_nid,
                    event_nid,
                    prev_nids,
                    prevs_in_region,
                    state_after_nid,
                    &region_lock,
                )
            }
            (EventKind::New, None) => Err(Error::MissingState(format!(
                "a room can only be activated by a join: {room_nid}"
            ))),
            (EventKind::Backfill, Some(region_nid)) => {
                let mutex_region = Arc::clone(
                    services()
                        .globals
                        .regionnid_mutex
                        .write()
                        .await
                        .entry(region_nid)
                        .or_default(),
                );
                let region_lock = mutex_region.lock().await;

                // Successors whose prev events are all in-region now stop
                // being backward tips.
                let mut resolved_successors = Vec::new();
                for successor_nid in services().rooms.timeline.referencing(event_nid)? {
                    let Some(successor) = services().rooms.timeline.get_pdu(successor_nid)? else {
                        continue;
                    };
                    let mut all_in_region = true;
                    for prev_id in successor.prev_event_ids() {
                        let in_region = match services().rooms.short.get_eventnid(prev_id)? {
                            Some(nid) => services().rooms.timeline.state_at(nid)?.is_some(),
                            None => false,
                        };
                        if !in_region {
                            all_in_region = false;
                            break;
                        }
                    }
                    if all_in_region {
                        resolved_successors.push(successor_nid);
                    }
                }

                services().rooms.region.extend_backward(
                    region_nid,
                    event_nid,
                    prevs_in_region,
                    &resolved_successors,
                    &region_lock,
                )?;
                Ok(false)
            }
            (EventKind::Backfill, None) => Err(Error::MissingState(format!(
                "cannot backfill a room without an active region: {room_nid}"
            ))),
            // Outliers never reach region handling.
            (EventKind::Outlier, _) => Ok(false),
        }
    }
}
