// =============================================================================
// Conclave Federated Room Server - Lib Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Crate root. Conclave is the core of a federated room-messaging
//   server: it ingests room events, authorizes them against per-room
//   state, resolves state conflicts deterministically, assigns durable
//   numeric identifiers and publishes the results to an output log.
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

pub mod api;
pub mod config;
pub mod database;
pub mod service;
pub mod utils;

use std::sync::OnceLock;

pub use api::{EventKind, InputEvent, InputPurgeHistory, InputRedact, OutputEvent};
pub use config::Config;
pub use database::KeyValueDatabase;
pub use service::{pdu::PduEvent, Services};
pub use utils::error::{Error, Result};

static SERVICES: OnceLock<Services> = OnceLock::new();

/// The global service container. Panics when called before [`init`].
pub fn services() -> &'static Services {
    SERVICES.get().expect("SERVICES should be initialized")
}

/// Opens the database and wires all services. May only be called once per
/// process.
pub fn init(config: Config) -> Result<&'static Services> {
    let db = KeyValueDatabase::load_or_create(&config)?;
    let db: &'static KeyValueDatabase = Box::leak(Box::new(db));
    let services_ = Services::build(db, config)?;
    if SERVICES.set(services_).is_err() {
        return Err(Error::Conflict("services are already initialized".to_owned()));
    }
    Ok(services())
}
