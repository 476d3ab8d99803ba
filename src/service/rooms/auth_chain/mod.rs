// =============================================================================
// Conclave Federated Room Server - Auth Chain Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Computes the transitive closure of auth events for a set of starting
//   events, caching per-event closures so repeated state resolutions do
//   not re-walk the graph.
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

use std::{collections::HashSet, sync::Arc};

pub use data::Data;
use tracing::{debug, trace};

use crate::{services, Result};

pub struct Service {
    pub db: &'static dyn Data,
}

impl Service {
    pub fn get_cached_authchain(&self, event_nid: u64) -> Result<Option<Arc<HashSet<u64>>>> {
        self.db.get_cached_authchain(event_nid)
    }

    pub fn cache_authchain(&self, event_nid: u64, chain: Arc<HashSet<u64>>) -> Result<()> {
        self.db.cache_authchain(event_nid, chain)
    }

    /// The union of the auth chains of the starting events. The starting
    /// events themselves are not part of the result.
    #[tracing::instrument(skip(self, starting_events))]
    pub async fn get_auth_chain(&self, starting_events: &[u64]) -> Result<HashSet<u64>> {
        let mut full_auth_chain = HashSet::new();

        let mut hits = 0;
        let mut misses = 0;
        for (i, &event_nid) in starting_events.iter().enumerate() {
            if let Some(cached) = self.db.get_cached_authchain(event_nid)? {
                hits += 1;
                full_auth_chain.extend(cached.iter().copied());
            } else {
                misses += 1;
                let chain = self.walk_auth_chain(event_nid)?;
                let chain = Arc::new(chain);
                self.db.cache_authchain(event_nid, Arc::clone(&chain))?;
                full_auth_chain.extend(chain.iter().copied());
            }

            if i % 100 == 0 {
                tokio::task::yield_now().await;
            }
        }

        debug!(
            "🔧 Auth chain over {} events: {} cache hits, {} misses, {} total",
            starting_events.len(),
            hits,
            misses,
            full_auth_chain.len()
        );
        Ok(full_auth_chain)
    }

    /// Walks auth event references from one event. References to events we
    /// never stored contribute nothing.
    fn walk_auth_chain(&self, event_nid: u64) -> Result<HashSet<u64>> {
        let mut chain = HashSet::new();
        let mut todo = vec![event_nid];

        while let Some(nid) = todo.pop() {
            let Some(pdu) = services().rooms.timeline.get_pdu(nid)? else {
                trace!("auth chain member {} has no stored body", nid);
                continue;
            };
            for auth_ref in &pdu.auth_events {
                let Some(auth_nid) = services().rooms.short.get_eventnid(&auth_ref.event_id)?
                else {
                    trace!("auth event {} not persisted", auth_ref.event_id);
                    continue;
                };
                if chain.insert(auth_nid) {
                    todo.push(auth_nid);
                }
            }
        }

        Ok(chain)
    }
}
