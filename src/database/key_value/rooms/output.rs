// =============================================================================
// Conclave Federated Room Server - Key Value Output Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   The output log tree: JSON-encoded records keyed by their big-endian
//   position.
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

use std::mem::size_of;

use crate::{api::OutputEvent, database::KeyValueDatabase, service, utils, Error, Result};

impl service::rooms::output::Data for KeyValueDatabase {
    fn append_output(&self, position: u64, output: &OutputEvent) -> Result<()> {
        let value = serde_json::to_vec(output)
            .map_err(|_| Error::bad_database("output record does not serialize"))?;
        self.outputlog.insert(&position.to_be_bytes(), &value)
    }

    fn outputs_since(&self, position: u64, limit: usize) -> Result<Vec<(u64, OutputEvent)>> {
        let from = position.saturating_add(1);
        let mut outputs = Vec::new();
        for (key, value) in self.outputlog.iter_from(&from.to_be_bytes(), false).take(limit) {
            if key.len() != size_of::<u64>() {
                return Err(Error::bad_database("output log key has wrong length"));
            }
            let record_position =
                utils::u64_from_bytes(&key).expect("key has the right length");
            let output: OutputEvent = serde_json::from_slice(&value)
                .map_err(|_| Error::bad_database("output record does not parse"))?;
            outputs.push((record_position, output));
        }
        Ok(outputs)
    }
}
