// =============================================================================
// Conclave Federated Room Server - Output Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   The output log. Every processed input appends one record under a
//   monotonic position; readers can resume from any position and must
//   tolerate a replay of the last record after a crash.
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

pub use data::Data;
use tracing::debug;

use crate::{api::OutputEvent, service::globals::Sequence, services, Result};

pub struct Service {
    pub db: &'static dyn Data,
}

impl Service {
    /// Appends an output record and returns its position.
    pub fn append(&self, output: &OutputEvent) -> Result<u64> {
        let position = services().globals.next_count(Sequence::Output)?;
        self.db.append_output(position, output)?;
        debug!(
            "📤 Output {} for event {} (rejected: {})",
            position, output.event_id, output.rejected
        );
        Ok(position)
    }

    pub fn outputs_since(&self, position: u64, limit: usize) -> Result<Vec<(u64, OutputEvent)>> {
        self.db.outputs_since(position, limit)
    }
}
