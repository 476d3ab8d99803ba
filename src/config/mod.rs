// =============================================================================
// Conclave Federated Room Server - Config Module
// =============================================================================
//
// Project: Conclave - High Performance Federated Room Messaging Server Core
// Author: Conclave Development Team
// Date: 2025-06-20
// Version: 0.1.0-alpha (Pluggable Storage Backend)
// License: Apache 2.0 / MIT
//
// Description:
//   Server configuration with serde defaults and startup validation.
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

use ruma::OwnedServerName;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::Result;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The server name this instance answers for, e.g. `conclave.example`.
    pub server_name: OwnedServerName,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_db_cache_capacity")]
    pub db_cache_capacity: usize,

    /// Number of delta blocks a state snapshot may carry before the list is
    /// compacted into a single equivalent block.
    #[serde(default = "default_state_block_compaction_threshold")]
    pub state_block_compaction_threshold: usize,

    #[serde(default = "default_log")]
    pub log: String,
}

impl Config {
    pub fn new(server_name: OwnedServerName) -> Self {
        Self {
            server_name,
            database_path: default_database_path(),
            db_cache_capacity: default_db_cache_capacity(),
            state_block_compaction_threshold: default_state_block_compaction_threshold(),
            log: default_log(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        debug!("🔧 Validating server configuration");

        if self.server_name.as_str().is_empty() {
            return Err(crate::Error::bad_config("Server name cannot be empty"));
        }

        if self.db_cache_capacity == 0 {
            return Err(crate::Error::bad_config(
                "Database cache capacity must be greater than 0",
            ));
        }

        if self.state_block_compaction_threshold == 0 {
            return Err(crate::Error::bad_config(
                "State block compaction threshold must be greater than 0",
            ));
        }

        if self.state_block_compaction_threshold > 1024 {
            warn!(
                "⚠️ Very large state block compaction threshold: {}",
                self.state_block_compaction_threshold
            );
        }

        info!("✅ Configuration validated for {}", self.server_name);
        Ok(())
    }
}

fn default_database_path() -> String {
    "./conclave.db".to_owned()
}

fn default_db_cache_capacity() -> usize {
    100_000
}

fn default_state_block_compaction_threshold() -> usize {
    64
}

fn default_log() -> String {
    "warn,conclave=info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config::new("conclave.test".try_into().expect("valid server name"))
    }

    #[test]
    fn test_config_defaults() {
        let config = test_config();
        assert_eq!(config.state_block_compaction_threshold, 64);
        assert_eq!(config.db_cache_capacity, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_thresholds() {
        let mut config = test_config();
        config.state_block_compaction_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.db_cache_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_toml_like_json() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "server_name": "conclave.test",
            "state_block_compaction_threshold": 8,
        }))
        .expect("config deserializes");
        assert_eq!(config.state_block_compaction_threshold, 8);
        assert_eq!(config.database_path, "./conclave.db");
    }
}
