//! # Loop Configuration
//!
//! Tunables for an [`crate::UpdateLoop`]. Deserializable so a host can keep
//! them in its own configuration file; every field has a default.

use crate::NetloopError;
use crate::primitives::{DEFAULT_ID_LIMIT, DEFAULT_INITIAL_CAPACITY, MAX_INITIAL_CAPACITY};
use serde::{Deserialize, Serialize};

/// Per-loop settings, applied to every stage registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    /// Entries reserved up front by each stage registry.
    pub initial_capacity: usize,
    /// Highest subscription identity a stage may issue.
    pub id_limit: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            id_limit: DEFAULT_ID_LIMIT,
        }
    }
}

impl LoopConfig {
    /// Builder-style override of the identity limit.
    #[must_use]
    pub fn with_id_limit(mut self, id_limit: u32) -> Self {
        self.id_limit = id_limit;
        self
    }

    /// Builder-style override of the initial capacity.
    #[must_use]
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Reject values the registry cannot honour.
    pub fn validate(&self) -> Result<(), NetloopError> {
        if self.id_limit == 0 {
            return Err(NetloopError::InvalidConfig(
                "id_limit must be at least 1".to_string(),
            ));
        }
        if self.initial_capacity > MAX_INITIAL_CAPACITY {
            return Err(NetloopError::InvalidConfig(format!(
                "initial_capacity {} exceeds maximum allowed {}",
                self.initial_capacity, MAX_INITIAL_CAPACITY
            )));
        }
        Ok(())
    }
}
