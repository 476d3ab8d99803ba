// =============================================================================
// Conclave Federated Room Server - Key Value Globals Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Global sequences over the counters tree. Each sequence increments
//   under its own key, starting at 1.
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

use crate::{
    database::KeyValueDatabase,
    service::{self, globals::Sequence},
    utils, Error, Result,
};

impl service::globals::Data for KeyValueDatabase {
    fn next_count(&self, sequence: Sequence) -> Result<u64> {
        utils::u64_from_bytes(&self.counters.increment(sequence.as_str().as_bytes())?)
            .map_err(|_| Error::bad_database("counter has an invalid value"))
    }
}
