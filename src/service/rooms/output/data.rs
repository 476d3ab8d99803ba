// =============================================================================
// Conclave Federated Room Server - Output Data Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Storage contract for the append-only output log read by downstream
//   consumers.
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

use crate::{api::OutputEvent, Result};

pub trait Data: Send + Sync {
    fn append_output(&self, position: u64, output: &OutputEvent) -> Result<()>;

    /// Output records strictly after the given position, in position order.
    fn outputs_since(&self, position: u64, limit: usize) -> Result<Vec<(u64, OutputEvent)>>;
}
