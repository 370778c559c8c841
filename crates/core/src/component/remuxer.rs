//! Remuxers tee a muxed stream into branches and re-mux each branch's
//! stream subset into fresh batches.

use std::collections::BTreeSet;

/// Batch size of 0 defers to the branch's stream count at play time.
pub const DEFAULT_REMUXER_BATCH_SIZE: u32 = 0;
/// Timeout of -1 disables timed flushes of partial batches.
pub const DEFAULT_REMUXER_BATCH_TIMEOUT_US: i32 = -1;

/// One child attached to a remuxer.
#[derive(Debug, Clone)]
pub struct BranchLink {
    pub name: String,
    /// Restrict the child to these upstream stream ids. `None` connects
    /// every stream.
    pub stream_ids: Option<BTreeSet<u32>>,
}

/// Mutable state for a remuxer component.
#[derive(Debug)]
pub struct RemuxerSpec {
    pub batch_size: u32,
    pub batch_timeout_us: i32,
    /// Children in add order.
    pub branches: Vec<BranchLink>,
}

impl Default for RemuxerSpec {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_REMUXER_BATCH_SIZE,
            batch_timeout_us: DEFAULT_REMUXER_BATCH_TIMEOUT_US,
            branches: Vec::new(),
        }
    }
}

impl RemuxerSpec {
    pub fn is_child(&self, name: &str) -> bool {
        self.branches.iter().any(|b| b.name == name)
    }

    pub fn add_branch(&mut self, name: &str, stream_ids: Option<BTreeSet<u32>>) {
        self.branches.push(BranchLink {
            name: name.to_owned(),
            stream_ids,
        });
    }

    /// Detach a child. Returns false when `name` is not attached.
    pub fn remove_branch(&mut self, name: &str) -> bool {
        let before = self.branches.len();
        self.branches.retain(|b| b.name != name);
        self.branches.len() != before
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }
}
