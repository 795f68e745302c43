//! Registry configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Configuration for the [`GroupRegistry`](crate::GroupRegistry).
///
/// Missing fields take their default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Capacity of the live event channel. Subscribers that fall further
    /// behind than this lose events and must catch up from the event log.
    pub event_capacity: usize,

    /// Check input proofs in the registry before the service round trip.
    pub verify_input_proofs: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            verify_input_proofs: true,
        }
    }
}

impl RegistryConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RegistryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Reject values the registry cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(RegistryError::Config("event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
