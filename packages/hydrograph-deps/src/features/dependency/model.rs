use crate::shared::models::DbKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// "A change to `ts_key` triggers `computation_id`"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub ts_key: DbKey,
    pub computation_id: DbKey,
}

impl DependencyEdge {
    pub fn new(ts_key: DbKey, computation_id: DbKey) -> Self {
        Self {
            ts_key,
            computation_id,
        }
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -> {})", self.ts_key, self.computation_id)
    }
}

/// Live-table rows written by one replace or rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub inserted: usize,
    pub deleted: usize,
}

impl ReplaceOutcome {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.deleted == 0
    }
}
