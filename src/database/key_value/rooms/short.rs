// =============================================================================
// Conclave Federated Room Server - Key Value Short Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Interning tables with LRU caches in front of the hot id lookups.
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

use ruma::{events::TimelineEventType, EventId, OwnedEventId, RoomId};

use crate::{
    database::KeyValueDatabase,
    service::{self, globals::Sequence},
    utils, Error, Result,
};

impl service::rooms::short::Data for KeyValueDatabase {
    fn get_roomnid(&self, room_id: &RoomId) -> Result<Option<u64>> {
        self.roomid_roomnid
            .get(room_id.as_bytes())?
            .map(|bytes| {
                utils::u64_from_bytes(&bytes)
                    .map_err(|_| Error::bad_database("room NID has invalid bytes"))
            })
            .transpose()
    }

    fn insert_new_room(&self, room_nid: u64, room_id: &RoomId) -> Result<()> {
        self.roomid_roomnid
            .insert(room_id.as_bytes(), &room_nid.to_be_bytes())
    }

    fn assign_event_nids(&self, event_ids: &[OwnedEventId]) -> Result<(Vec<u64>, u64)> {
        let mut nids = Vec::with_capacity(event_ids.len());
        let mut smallest_new_nid = 0;

        for event_id in event_ids {
            if let Some(nid) = self.get_eventnid(event_id)? {
                nids.push(nid);
                continue;
            }
            let nid =
                service::globals::Data::next_count(self, Sequence::Event)?;
            self.eventid_eventnid
                .insert(event_id.as_bytes(), &nid.to_be_bytes())?;
            self.eventnid_eventid
                .insert(&nid.to_be_bytes(), event_id.as_bytes())?;
            self.eventid_nid_cache
                .lock()
                .unwrap()
                .insert(event_id.clone(), nid);
            if smallest_new_nid == 0 || nid < smallest_new_nid {
                smallest_new_nid = nid;
            }
            nids.push(nid);
        }

        Ok((nids, smallest_new_nid))
    }

    fn get_eventnid(&self, event_id: &EventId) -> Result<Option<u64>> {
        if let Some(nid) = self
            .eventid_nid_cache
            .lock()
            .unwrap()
            .get_mut(&event_id.to_owned())
        {
            return Ok(Some(*nid));
        }

        let Some(bytes) = self.eventid_eventnid.get(event_id.as_bytes())? else {
            return Ok(None);
        };
        let nid = utils::u64_from_bytes(&bytes)
            .map_err(|_| Error::bad_database("event NID has invalid bytes"))?;
        self.eventid_nid_cache
            .lock()
            .unwrap()
            .insert(event_id.to_owned(), nid);
        Ok(Some(nid))
    }

    fn get_eventid_from_nid(&self, event_nid: u64) -> Result<OwnedEventId> {
        let bytes = self
            .eventnid_eventid
            .get(&event_nid.to_be_bytes())?
            .ok_or_else(|| Error::bad_database("event NID has no event id"))?;
        utils::string_from_bytes(&bytes)
            .map_err(|_| Error::bad_database("event id in database is not valid UTF-8"))?
            .try_into()
            .map_err(|_| Error::bad_database("event id in database is invalid"))
    }

    fn get_or_create_eventtype_nid(&self, event_type: &TimelineEventType) -> Result<u64> {
        if let Some(nid) = self.get_eventtype_nid(event_type)? {
            return Ok(nid);
        }

        let string = event_type.to_string();
        let nid = service::globals::Data::next_count(self, Sequence::EventType)?;
        self.eventtype_eventtypenid
            .insert(string.as_bytes(), &nid.to_be_bytes())?;
        self.eventtypenid_eventtype
            .insert(&nid.to_be_bytes(), string.as_bytes())?;
        self.eventtype_nid_cache
            .lock()
            .unwrap()
            .insert(string, nid);
        Ok(nid)
    }

    fn get_eventtype_nid(&self, event_type: &TimelineEventType) -> Result<Option<u64>> {
        let string = event_type.to_string();
        if let Some(nid) = self.eventtype_nid_cache.lock().unwrap().get_mut(&string) {
            return Ok(Some(*nid));
        }

        let Some(bytes) = self.eventtype_eventtypenid.get(string.as_bytes())? else {
            return Ok(None);
        };
        let nid = utils::u64_from_bytes(&bytes)
            .map_err(|_| Error::bad_database("event type NID has invalid bytes"))?;
        self.eventtype_nid_cache.lock().unwrap().insert(string, nid);
        Ok(Some(nid))
    }

    fn get_eventtype_from_nid(&self, event_type_nid: u64) -> Result<TimelineEventType> {
        if let Some(event_type) = self
            .nid_eventtype_cache
            .lock()
            .unwrap()
            .get_mut(&event_type_nid)
        {
            return Ok(event_type.clone());
        }

        let bytes = self
            .eventtypenid_eventtype
            .get(&event_type_nid.to_be_bytes())?
            .ok_or_else(|| Error::bad_database("event type NID has no event type"))?;
        let string = utils::string_from_bytes(&bytes)
            .map_err(|_| Error::bad_database("event type in database is not valid UTF-8"))?;
        let event_type = TimelineEventType::from(string.as_str());
        self.nid_eventtype_cache
            .lock()
            .unwrap()
            .insert(event_type_nid, event_type.clone());
        Ok(event_type)
    }

    fn get_or_create_statekey_nid(&self, state_key: &str) -> Result<u64> {
        if let Some(nid) = self.get_statekey_nid(state_key)? {
            return Ok(nid);
        }

        let nid = service::globals::Data::next_count(self, Sequence::StateKey)?;
        self.statekey_statekeynid
            .insert(state_key.as_bytes(), &nid.to_be_bytes())?;
        self.statekeynid_statekey
            .insert(&nid.to_be_bytes(), state_key.as_bytes())?;
        self.statekey_nid_cache
            .lock()
            .unwrap()
            .insert(state_key.to_owned(), nid);
        Ok(nid)
    }

    fn get_statekey_nid(&self, state_key: &str) -> Result<Option<u64>> {
        if let Some(nid) = self
            .statekey_nid_cache
            .lock()
            .unwrap()
            .get_mut(&state_key.to_owned())
        {
            return Ok(Some(*nid));
        }

        let Some(bytes) = self.statekey_statekeynid.get(state_key.as_bytes())? else {
            return Ok(None);
        };
        let nid = utils::u64_from_bytes(&bytes)
            .map_err(|_| Error::bad_database("state key NID has invalid bytes"))?;
        self.statekey_nid_cache
            .lock()
            .unwrap()
            .insert(state_key.to_owned(), nid);
        Ok(Some(nid))
    }

    fn get_statekey_from_nid(&self, state_key_nid: u64) -> Result<String> {
        if let Some(state_key) = self
            .nid_statekey_cache
            .lock()
            .unwrap()
            .get_mut(&state_key_nid)
        {
            return Ok(state_key.clone());
        }

        let bytes = self
            .statekeynid_statekey
            .get(&state_key_nid.to_be_bytes())?
            .ok_or_else(|| Error::bad_database("state key NID has no state key"))?;
        let state_key = utils::string_from_bytes(&bytes)
            .map_err(|_| Error::bad_database("state key in database is not valid UTF-8"))?;
        self.nid_statekey_cache
            .lock()
            .unwrap()
            .insert(state_key_nid, state_key.clone());
        Ok(state_key)
    }
}
