// =============================================================================
// Conclave Federated Room Server - Auth Chain Data Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Storage contract for cached auth chains: the transitive closure of an
//   event's auth events, keyed by event NID.
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

use crate::Result;

pub trait Data: Send + Sync {
    fn get_cached_authchain(&self, event_nid: u64) -> Result<Option<Arc<HashSet<u64>>>>;

    fn cache_authchain(&self, event_nid: u64, chain: Arc<HashSet<u64>>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::RwLock,
    };

    #[derive(Default)]
    struct MockAuthChainData {
        chains: RwLock<HashMap<u64, Arc<HashSet<u64>>>>,
    }

    impl Data for MockAuthChainData {
        fn get_cached_authchain(&self, event_nid: u64) -> Result<Option<Arc<HashSet<u64>>>> {
            Ok(self.chains.read().unwrap().get(&event_nid).cloned())
        }

        fn cache_authchain(&self, event_nid: u64, chain: Arc<HashSet<u64>>) -> Result<()> {
            self.chains.write().unwrap().insert(event_nid, chain);
            Ok(())
        }
    }

    #[test]
    fn test_cache_round_trip() {
        let data = MockAuthChainData::default();
        assert!(data.get_cached_authchain(1).unwrap().is_none());

        let chain: Arc<HashSet<u64>> = Arc::new([2, 3, 4].into_iter().collect());
        data.cache_authchain(1, Arc::clone(&chain)).unwrap();

        let cached = data.get_cached_authchain(1).unwrap().unwrap();
        assert_eq!(*cached, *chain);
    }
}
