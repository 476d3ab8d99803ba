// =============================================================================
// Conclave Federated Room Server - Globals Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Server-wide state: configuration access, the monotonic identifier
//   sequences and the named per-room mutex registries that serialize all
//   work within a room while rooms stay independent of each other.
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

use std::{
    collections::HashMap,
    sync::{atomic::AtomicBool, Arc},
};

pub use data::{Data, Sequence};
use ruma::{OwnedRoomId, ServerName};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::{Config, Result};

pub struct Service {
    pub db: &'static dyn Data,

    pub config: Config,

    /// Taken while the first events of a room are inserted, keyed by room
    /// id because no room NID exists yet.
    pub roomid_mutex_create: RwLock<HashMap<OwnedRoomId, Arc<Mutex<()>>>>,
    /// Serializes steady-state work per room. Must be acquired after the
    /// create mutex and before the region mutex.
    pub roomnid_mutex_activate: RwLock<HashMap<u64, Arc<Mutex<()>>>>,
    /// Taken while a region's tips or frontier move. Innermost lock.
    pub regionnid_mutex: RwLock<HashMap<u64, Arc<Mutex<()>>>>,

    pub shutdown: AtomicBool,
}

impl Service {
    pub fn load(db: &'static dyn Data, config: Config) -> Result<Self> {
        config.validate()?;
        info!("✅ Globals loaded for {}", config.server_name);

        Ok(Self {
            db,
            config,
            roomid_mutex_create: RwLock::new(HashMap::new()),
            roomnid_mutex_activate: RwLock::new(HashMap::new()),
            regionnid_mutex: RwLock::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn server_name(&self) -> &ServerName {
        &self.config.server_name
    }

    pub fn state_block_compaction_threshold(&self) -> usize {
        self.config.state_block_compaction_threshold
    }

    /// Draws the next value from one of the global sequences.
    pub fn next_count(&self, sequence: Sequence) -> Result<u64> {
        self.db.next_count(sequence)
    }

    pub async fn shutdown(&self) {
        self.shutdown
            .store(true, std::sync::atomic::Ordering::Relaxed);
        info!("Shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Once,
    };

    static INIT: Once = Once::new();

    fn init_test_env() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter("debug")
                .try_init();
        });
    }

    struct MockGlobalsData {
        counter: AtomicU64,
    }

    impl Data for MockGlobalsData {
        fn next_count(&self, _sequence: Sequence) -> crate::Result<u64> {
            Ok(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[test]
    fn test_next_count_is_monotonic() {
        init_test_env();
        let data = MockGlobalsData {
            counter: AtomicU64::new(0),
        };
        let first = data.next_count(Sequence::Event).unwrap();
        let second = data.next_count(Sequence::Event).unwrap();
        assert_eq!(first, 1, "sequences start at 1");
        assert!(second > first);
    }
}
