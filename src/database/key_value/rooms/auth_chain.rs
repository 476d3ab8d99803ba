// =============================================================================
// Conclave Federated Room Server - Key Value Auth Chain Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Cached auth chains: an LRU layer over the persistent chain tree.
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

use std::{collections::HashSet, mem::size_of, sync::Arc};

use crate::{database::KeyValueDatabase, service, utils, Error, Result};

impl service::rooms::auth_chain::Data for KeyValueDatabase {
    fn get_cached_authchain(&self, event_nid: u64) -> Result<Option<Arc<HashSet<u64>>>> {
        if let Some(chain) = self.auth_chain_cache.lock().unwrap().get_mut(&event_nid) {
            return Ok(Some(Arc::clone(chain)));
        }

        let Some(bytes) = self.eventnid_authchain.get(&event_nid.to_be_bytes())? else {
            return Ok(None);
        };
        if bytes.len() % size_of::<u64>() != 0 {
            return Err(Error::bad_database("auth chain has wrong length"));
        }
        let chain: Arc<HashSet<u64>> = Arc::new(
            bytes
                .chunks_exact(size_of::<u64>())
                .map(|chunk| utils::u64_from_bytes(chunk).expect("chunk has the right length"))
                .collect(),
        );
        self.auth_chain_cache
            .lock()
            .unwrap()
            .insert(event_nid, Arc::clone(&chain));
        Ok(Some(chain))
    }

    fn cache_authchain(&self, event_nid: u64, chain: Arc<HashSet<u64>>) -> Result<()> {
        let mut value = Vec::with_capacity(chain.len() * size_of::<u64>());
        for nid in chain.iter() {
            value.extend_from_slice(&nid.to_be_bytes());
        }
        self.eventnid_authchain
            .insert(&event_nid.to_be_bytes(), &value)?;
        self.auth_chain_cache
            .lock()
            .unwrap()
            .insert(event_nid, chain);
        Ok(())
    }
}
