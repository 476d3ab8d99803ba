// =============================================================================
// Conclave Federated Room Server - Utils Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Shared helpers: content hashing, big-endian integer codecs, the
//   millisecond clock and identifier domain extraction.
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

pub mod error;

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// SHA-256 of the input, hex encoded. Used for state block content
/// addressing and for the deterministic event ordering during state
/// resolution.
pub fn calculate_hash(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}

/// Returns the current time in milliseconds since Unix epoch
pub fn millis_since_unix_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time is valid")
        .as_millis() as u64
}

/// Parses a big-endian byte slice into a u64.
pub fn u64_from_bytes(bytes: &[u8]) -> std::result::Result<u64, std::array::TryFromSliceError> {
    let array: [u8; 8] = bytes.try_into()?;
    Ok(u64::from_be_bytes(array))
}

/// Parses bytes into a UTF-8 string.
pub fn string_from_bytes(bytes: &[u8]) -> std::result::Result<String, std::string::FromUtf8Error> {
    String::from_utf8(bytes.to_vec())
}

/// Increments a big-endian encoded u64 counter, starting at 1 when no
/// previous value exists.
pub fn increment(old: Option<&[u8]>) -> Vec<u8> {
    let number = match old.map(|bytes| bytes.try_into()) {
        Some(Ok(bytes)) => {
            let number = u64::from_be_bytes(bytes);
            number.wrapping_add(1)
        }
        // Start at one. Zero is reserved for "no value".
        _ => 1,
    };

    number.to_be_bytes().to_vec()
}

/// Extracts the domain part from an identifier of the form
/// `<sigil><localpart>:<domain>`.
///
/// Room, user and event identifiers all carry their origin server after the
/// first colon; several authorization rules are scoped to that server.
pub fn domain_from_id(id: &str) -> Result<&str> {
    match id.split_once(':') {
        Some((local, domain)) if local.len() > 1 && !domain.is_empty() => Ok(domain),
        _ => Err(Error::InvalidId(format!(
            "identifier has no domain part: {id:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_hash_is_stable() {
        let a = calculate_hash(b"conclave");
        let b = calculate_hash(b"conclave");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "SHA-256 hex digest is 64 characters");
        assert_ne!(a, calculate_hash(b"conclave!"));
    }

    #[test]
    fn test_increment_starts_at_one() {
        let first = increment(None);
        assert_eq!(u64_from_bytes(&first).unwrap(), 1);

        let second = increment(Some(&first));
        assert_eq!(u64_from_bytes(&second).unwrap(), 2);
    }

    #[test]
    fn test_u64_round_trip() {
        let bytes = 98765u64.to_be_bytes();
        assert_eq!(u64_from_bytes(&bytes).unwrap(), 98765);
        assert!(u64_from_bytes(&bytes[1..]).is_err());
    }

    #[test]
    fn test_domain_from_id() {
        assert_eq!(domain_from_id("@alice:example.com").unwrap(), "example.com");
        assert_eq!(domain_from_id("!room:example.com").unwrap(), "example.com");
        assert_eq!(domain_from_id("$event:other.org").unwrap(), "other.org");

        assert!(domain_from_id("no-colon").is_err());
        assert!(domain_from_id(":empty-local").is_err());
        assert!(domain_from_id("@trailing:").is_err());
    }
}
