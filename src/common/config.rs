//! Configuration for minicoord recipes

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// Construction parameters for a double barrier.
///
/// `name` is the shared parent node grouping all participants of one logical
/// barrier; `entry_name` is this participant's ephemeral child, unique per
/// participant; `size` is the number of participants the barrier waits for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierSpec {
    /// Barrier name (becomes the node `/<name>`)
    pub name: String,

    /// This participant's entry node name
    pub entry_name: String,

    /// Number of participants
    #[serde(default = "default_size")]
    pub size: usize,
}

fn default_size() -> usize {
    1
}

impl BarrierSpec {
    pub fn new(name: impl Into<String>, entry_name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            entry_name: entry_name.into(),
            size,
        }
    }

    /// Check the spec before any node is touched.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidArgument("size must be > 0".into()));
        }
        if self.name.is_empty() || self.name.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "invalid barrier name: {:?}",
                self.name
            )));
        }
        if self.entry_name.is_empty() || self.entry_name.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "invalid entry name: {:?}",
                self.entry_name
            )));
        }
        Ok(())
    }
}
