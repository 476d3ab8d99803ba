// =============================================================================
// Conclave Federated Room Server - Rooms Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Aggregation of the room sub-services: interning, event storage, state
//   blocks and snapshots, state resolution, auth chains, active regions,
//   the input pipeline and the output log.
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

pub mod auth_chain;
pub mod event_handler;
pub mod output;
pub mod region;
pub mod short;
pub mod state;
pub mod state_resolver;
pub mod timeline;

pub trait Data:
    auth_chain::Data + output::Data + region::Data + short::Data + state::Data + timeline::Data
{
}

impl<T> Data for T where
    T: auth_chain::Data + output::Data + region::Data + short::Data + state::Data + timeline::Data
{
}

pub struct Service {
    pub auth_chain: auth_chain::Service,
    pub event_handler: event_handler::Service,
    pub output: output::Service,
    pub region: region::Service,
    pub short: short::Service,
    pub state: state::Service,
    pub state_resolver: state_resolver::Service,
    pub timeline: timeline::Service,
}
