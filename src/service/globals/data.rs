// =============================================================================
// Conclave Federated Room Server - Globals Data Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Storage contract for the global monotonic identifier sequences. Every
//   numeric identifier in the system is drawn from one of these sequences,
//   starting at 1 and never reused.
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

use crate::Result;

/// The identifier sequences owned by the database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sequence {
    Room,
    Event,
    EventType,
    StateKey,
    StateSnapshot,
    StateBlock,
    Region,
    Output,
}

impl Sequence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Event => "event",
            Self::EventType => "event_type",
            Self::StateKey => "state_key",
            Self::StateSnapshot => "state_snapshot",
            Self::StateBlock => "state_block",
            Self::Region => "region",
            Self::Output => "output",
        }
    }
}

pub trait Data: Send + Sync {
    /// Returns the next value of the sequence. Values start at 1.
    fn next_count(&self, sequence: Sequence) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_names_are_distinct() {
        let sequences = [
            Sequence::Room,
            Sequence::Event,
            Sequence::EventType,
            Sequence::StateKey,
            Sequence::StateSnapshot,
            Sequence::StateBlock,
            Sequence::Region,
            Sequence::Output,
        ];
        let mut names: Vec<_> = sequences.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), sequences.len());
    }
}
