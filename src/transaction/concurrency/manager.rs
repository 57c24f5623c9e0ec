use std::collections::HashMap;
use std::sync::Arc;

use crate::common::types::BlockId;
use crate::transaction::concurrency::lock_table::{LockTable, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// A transaction's view of the global lock table, enforcing strict
/// two-phase locking.
///
/// The manager remembers which locks this transaction already holds so a
/// re-request never touches the shared table, and it releases everything in
/// one shot at commit or rollback, never earlier.
pub struct ConcurrencyManager {
    lock_table: Arc<LockTable>,
    locks: HashMap<BlockId, LockMode>,
}

impl ConcurrencyManager {
    pub fn new(lock_table: Arc<LockTable>) -> Self {
        Self {
            lock_table,
            locks: HashMap::new(),
        }
    }

    /// Ensure at least a shared lock on the block.
    pub fn s_lock(&mut self, blk: &BlockId) -> Result<()> {
        if !self.locks.contains_key(blk) {
            self.lock_table.s_lock(blk)?;
            self.locks.insert(blk.clone(), LockMode::Shared);
        }
        Ok(())
    }

    /// Ensure an exclusive lock on the block, taking the shared lock first
    /// and upgrading it.
    pub fn x_lock(&mut self, blk: &BlockId) -> Result<()> {
        if self.locks.get(blk) != Some(&LockMode::Exclusive) {
            self.s_lock(blk)?;
            self.lock_table.x_lock(blk)?;
            self.locks.insert(blk.clone(), LockMode::Exclusive);
        }
        Ok(())
    }

    /// Release every lock this transaction holds. Called exactly once, at
    /// commit or rollback.
    pub fn release(&mut self) {
        for blk in self.locks.keys() {
            self.lock_table.unlock(blk);
        }
        self.locks.clear();
    }
}
