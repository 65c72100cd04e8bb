//! Queue statistics shared between the storage layer and the worker pool.

use serde::{Deserialize, Serialize};

/// Snapshot of the queue directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Number of pending markers.
    pub pending: u64,
    /// Number of claim markers (in-flight or orphaned).
    pub claimed: u64,
}

impl QueueStats {
    /// Total markers in the queue directory.
    pub fn total(&self) -> u64 {
        self.pending + self.claimed
    }

    pub fn is_idle(&self) -> bool {
        self.total() == 0
    }
}
