// =============================================================================
// Conclave Federated Room Server - Database Abstraction Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Engine abstraction: an engine opens named trees of byte keys and
//   values. The room pipeline only ever talks to trees, so storage
//   backends can be swapped without touching the services.
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

pub mod memory;

use std::sync::Arc;

use crate::{Config, Result};

pub trait KeyValueDatabaseEngine: Send + Sync {
    fn open(config: &Config) -> Result<Self>
    where
        Self: Sized;

    fn open_tree(&self, name: &'static str) -> Result<Arc<dyn KvTree>>;

    fn flush(&self) -> Result<()>;

    fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    fn memory_usage(&self) -> Result<String> {
        Ok("Current database engine does not support memory usage reporting.".to_owned())
    }
}

pub trait KvTree: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn insert_batch(&self, iter: &mut dyn Iterator<Item = (Vec<u8>, Vec<u8>)>) -> Result<()>;

    fn remove(&self, key: &[u8]) -> Result<()>;

    /// Key-value pairs starting at `from` (inclusive), walking forwards or
    /// backwards.
    fn iter_from<'a>(
        &'a self,
        from: &[u8],
        backwards: bool,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

    /// Key-value pairs whose keys start with the prefix, in key order.
    fn scan_prefix<'a>(
        &'a self,
        prefix: Vec<u8>,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

    /// Atomically increments the big-endian u64 counter stored under the
    /// key, starting at 1, and returns the new value bytes.
    fn increment(&self, key: &[u8]) -> Result<Vec<u8>>;
}
