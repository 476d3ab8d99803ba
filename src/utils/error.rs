// =============================================================================
// Conclave Federated Room Server - Error Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Crate-wide error taxonomy and result alias. Every service in the room
//   pipeline reports through this enum so callers can tell recoverable
//   conditions (rejected events, deferred inputs) from fatal storage
//   integrity failures.
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

use std::io;

use thiserror::Error;
use tracing::error;

/// Conclave global error type
#[derive(Debug, Error)]
pub enum Error {
    /// Event JSON failed to parse or a required field is missing.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// A room, user or event identifier is malformed.
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// The event violates the room's authorization rules. Recoverable at the
    /// input level: the event is persisted as rejected and the region is left
    /// untouched.
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// Required state or prev events are not persisted yet. The input stays
    /// unprocessed and may be retried after a backfill.
    #[error("Missing state: {0}")]
    MissingState(String),

    /// A referenced state snapshot is absent from storage. Fatal.
    #[error("Missing state snapshot: {0}")]
    MissingSnapshot(u64),

    /// A referenced state block is absent from storage. Fatal.
    #[error("Missing state block: {0}")]
    MissingBlock(u64),

    /// Uniqueness violation on duplicate content. Treated as idempotent
    /// success by writers.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database or lock acquisition failure worth retrying with backoff.
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    BadDatabase(&'static str),

    #[error("Configuration error: {0}")]
    BadConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn bad_database(message: &'static str) -> Self {
        error!("💥 Database integrity failure: {}", message);
        Self::BadDatabase(message)
    }

    pub fn bad_config(message: &str) -> Self {
        error!("💥 Configuration error: {}", message);
        Self::BadConfig(message.to_owned())
    }

    /// Whether this error only rejects the current event instead of aborting
    /// the pipeline.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotAllowed(_) | Self::InvalidEvent(_) | Self::InvalidId(_)
        )
    }
}

/// Conclave global result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_allowed_error() {
        let error = Error::NotAllowed("sender not in room".to_owned());
        assert!(error.to_string().contains("Not allowed"));
        assert!(error.to_string().contains("sender not in room"));
        assert!(error.is_rejection());
    }

    #[test]
    fn test_missing_state_error() {
        let error = Error::MissingState("$event:domain".to_owned());
        assert!(error.to_string().contains("Missing state"));
        assert!(!error.is_rejection());
    }

    #[test]
    fn test_storage_integrity_errors() {
        let error = Error::MissingSnapshot(42);
        assert!(error.to_string().contains("42"));

        let error = Error::bad_database("tree entry has wrong length");
        assert!(error.to_string().contains("Database error"));
        assert!(!error.is_rejection());
    }

    #[test]
    fn test_invalid_event_is_rejection() {
        let error = Error::InvalidEvent("missing depth".to_owned());
        assert!(error.is_rejection());

        let error = Error::InvalidId("no colon in identifier".to_owned());
        assert!(error.is_rejection());
    }
}
