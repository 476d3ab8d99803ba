// =============================================================================
// Conclave Federated Room Server - Service Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Central service container. Each sub-service owns one concern of the
//   room pipeline and talks to storage through its own Data trait, all
//   satisfied by a single database handle.
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

pub mod auth;
pub mod globals;
pub mod pdu;
pub mod rooms;

use tracing::info;

use crate::{Config, Result};

pub struct Services {
    pub globals: globals::Service,
    pub rooms: rooms::Service,
}

impl Services {
    /// Builds and wires all services against one database handle.
    pub fn build<D: globals::Data + rooms::Data + 'static>(
        db: &'static D,
        config: Config,
    ) -> Result<Self> {
        let services = Self {
            globals: globals::Service::load(db, config)?,
            rooms: rooms::Service {
                auth_chain: rooms::auth_chain::Service { db },
                event_handler: rooms::event_handler::Service,
                output: rooms::output::Service { db },
                region: rooms::region::Service { db },
                short: rooms::short::Service { db },
                state: rooms::state::Service::new(db),
                state_resolver: rooms::state_resolver::Service,
                timeline: rooms::timeline::Service { db },
            },
        };

        info!("✅ All services initialized");
        Ok(services)
    }
}
