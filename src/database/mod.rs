// =============================================================================
// Conclave Federated Room Server - Database Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   The concrete database: one handle holding every named tree plus the
//   bounded caches in front of the hot interning lookups. Implements the
//   Data trait of every service.
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

pub mod abstraction;
pub mod key_value;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use lru_cache::LruCache;
use ruma::{events::TimelineEventType, OwnedEventId};
use tracing::info;

use self::abstraction::{KeyValueDatabaseEngine, KvTree};
use crate::{service::pdu::PduEvent, Config, Result};

pub struct KeyValueDatabase {
    _db: Arc<dyn KeyValueDatabaseEngine>,

    pub(crate) counters: Arc<dyn KvTree>,

    pub(crate) roomid_roomnid: Arc<dyn KvTree>,

    pub(crate) eventid_eventnid: Arc<dyn KvTree>,
    pub(crate) eventnid_eventid: Arc<dyn KvTree>,
    pub(crate) eventtype_eventtypenid: Arc<dyn KvTree>,
    pub(crate) eventtypenid_eventtype: Arc<dyn KvTree>,
    pub(crate) statekey_statekeynid: Arc<dyn KvTree>,
    pub(crate) statekeynid_statekey: Arc<dyn KvTree>,

    pub(crate) eventnid_pdu: Arc<dyn KvTree>,
    pub(crate) eventnid_meta: Arc<dyn KvTree>,
    pub(crate) eventnid_stateat: Arc<dyn KvTree>,
    pub(crate) roomnid_depth_eventnid: Arc<dyn KvTree>,
    pub(crate) referenced_eventnids: Arc<dyn KvTree>,

    pub(crate) statehash_blocknid: Arc<dyn KvTree>,
    pub(crate) blocknid_entries: Arc<dyn KvTree>,
    pub(crate) snapshotnid_blocks: Arc<dyn KvTree>,

    pub(crate) roomnid_regionnid: Arc<dyn KvTree>,
    pub(crate) regionnid_region: Arc<dyn KvTree>,

    pub(crate) eventnid_authchain: Arc<dyn KvTree>,

    pub(crate) outputlog: Arc<dyn KvTree>,

    pub(crate) pdu_cache: Mutex<LruCache<u64, Arc<PduEvent>>>,
    pub(crate) eventid_nid_cache: Mutex<LruCache<OwnedEventId, u64>>,
    pub(crate) eventtype_nid_cache: Mutex<LruCache<String, u64>>,
    pub(crate) nid_eventtype_cache: Mutex<LruCache<u64, TimelineEventType>>,
    pub(crate) statekey_nid_cache: Mutex<LruCache<String, u64>>,
    pub(crate) nid_statekey_cache: Mutex<LruCache<u64, String>>,
    pub(crate) auth_chain_cache: Mutex<LruCache<u64, Arc<HashSet<u64>>>>,
}

impl KeyValueDatabase {
    /// Opens the storage engine and every tree the services need.
    pub fn load_or_create(config: &Config) -> Result<Self> {
        let builder: Arc<dyn KeyValueDatabaseEngine> =
            Arc::new(abstraction::memory::Engine::open(config)?);
        let cache_capacity = config.db_cache_capacity;

        let db = Self {
            counters: builder.open_tree("counters")?,

            roomid_roomnid: builder.open_tree("roomid_roomnid")?,

            eventid_eventnid: builder.open_tree("eventid_eventnid")?,
            eventnid_eventid: builder.open_tree("eventnid_eventid")?,
            eventtype_eventtypenid: builder.open_tree("eventtype_eventtypenid")?,
            eventtypenid_eventtype: builder.open_tree("eventtypenid_eventtype")?,
            statekey_statekeynid: builder.open_tree("statekey_statekeynid")?,
            statekeynid_statekey: builder.open_tree("statekeynid_statekey")?,

            eventnid_pdu: builder.open_tree("eventnid_pdu")?,
            eventnid_meta: builder.open_tree("eventnid_meta")?,
            eventnid_stateat: builder.open_tree("eventnid_stateat")?,
            roomnid_depth_eventnid: builder.open_tree("roomnid_depth_eventnid")?,
            referenced_eventnids: builder.open_tree("referenced_eventnids")?,

            statehash_blocknid: builder.open_tree("statehash_blocknid")?,
            blocknid_entries: builder.open_tree("blocknid_entries")?,
            snapshotnid_blocks: builder.open_tree("snapshotnid_blocks")?,

            roomnid_regionnid: builder.open_tree("roomnid_regionnid")?,
            regionnid_region: builder.open_tree("regionnid_region")?,

            eventnid_authchain: builder.open_tree("eventnid_authchain")?,

            outputlog: builder.open_tree("outputlog")?,

            pdu_cache: Mutex::new(LruCache::new(cache_capacity)),
            eventid_nid_cache: Mutex::new(LruCache::new(cache_capacity)),
            eventtype_nid_cache: Mutex::new(LruCache::new(cache_capacity)),
            nid_eventtype_cache: Mutex::new(LruCache::new(cache_capacity)),
            statekey_nid_cache: Mutex::new(LruCache::new(cache_capacity)),
            nid_statekey_cache: Mutex::new(LruCache::new(cache_capacity)),
            auth_chain_cache: Mutex::new(LruCache::new(cache_capacity)),

            _db: builder,
        };

        info!("✅ Database opened at {}", config.database_path);
        Ok(db)
    }

    pub fn flush(&self) -> Result<()> {
        self._db.flush()
    }
}
