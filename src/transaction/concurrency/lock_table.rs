use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::common::types::BlockId;

/// A lock wait outlived its deadline. The requesting transaction should
/// roll back and retry from scratch.
#[derive(Error, Debug)]
#[error("lock request timed out")]
pub struct LockAbortError;

pub type Result<T> = std::result::Result<T, LockAbortError>;

/// Per-block monitor. `val` encodes the lock state: 0 unlocked, a positive
/// count of shared holders, or -1 for one exclusive holder. Waiters park on
/// this monitor's condvar only, so releasing one block never wakes threads
/// queued on another.
struct BlockLock {
    val: Mutex<i32>,
    released: Condvar,
}

/// The process-global lock table: block-granular shared/exclusive locks
/// with deadlock avoidance by timeout.
///
/// The table's own mutex guards only the block→monitor map and is held just
/// long enough to look a monitor up; all waiting happens on the per-block
/// monitors.
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, Arc<BlockLock>>>,
    max_wait: Duration,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl LockTable {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            max_wait,
        }
    }

    /// Take a shared lock on the block, waiting out an exclusive holder up
    /// to the deadline.
    pub fn s_lock(&self, blk: &BlockId) -> Result<()> {
        let monitor = self.monitor(blk);
        let deadline = Instant::now() + self.max_wait;

        let mut val = monitor.val.lock();
        while *val < 0 {
            if monitor.released.wait_until(&mut val, deadline).timed_out() {
                break;
            }
        }
        if *val < 0 {
            warn!("shared lock on {blk} timed out after {:?}", self.max_wait);
            return Err(LockAbortError);
        }
        *val += 1;
        Ok(())
    }

    /// Upgrade to an exclusive lock. The caller is expected to hold its own
    /// shared lock already, so `val == 1` means "nobody but me" and the
    /// upgrade can proceed; anything else is contention to wait out. A
    /// timed-out request fails while the block is held in either mode, so
    /// a writer can never be granted over live readers.
    pub fn x_lock(&self, blk: &BlockId) -> Result<()> {
        let monitor = self.monitor(blk);
        let deadline = Instant::now() + self.max_wait;

        let mut val = monitor.val.lock();
        while *val > 1 || *val < 0 {
            if monitor.released.wait_until(&mut val, deadline).timed_out() {
                break;
            }
        }
        if *val > 1 || *val < 0 {
            warn!("exclusive lock on {blk} timed out after {:?}", self.max_wait);
            return Err(LockAbortError);
        }
        *val = -1;
        Ok(())
    }

    /// Drop one hold on the block. The last holder resets the state and
    /// wakes everyone queued on this block.
    pub fn unlock(&self, blk: &BlockId) {
        let monitor = self.locks.lock().get(blk).cloned();
        if let Some(monitor) = monitor {
            let mut val = monitor.val.lock();
            if *val > 1 {
                *val -= 1;
            } else {
                *val = 0;
                monitor.released.notify_all();
            }
        }
    }

    fn monitor(&self, blk: &BlockId) -> Arc<BlockLock> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(blk.clone()).or_insert_with(|| {
            Arc::new(BlockLock {
                val: Mutex::new(0),
                released: Condvar::new(),
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn quick_table() -> LockTable {
        LockTable::new(Duration::from_millis(100))
    }

    #[test]
    fn shared_locks_coexist() {
        let table = quick_table();
        let blk = BlockId::new("t.tbl", 0);
        table.s_lock(&blk).unwrap();
        table.s_lock(&blk).unwrap();
        table.unlock(&blk);
        table.unlock(&blk);
    }

    #[test]
    fn exclusive_blocks_shared_until_unlock() {
        let table = Arc::new(quick_table());
        let blk = BlockId::new("t.tbl", 0);

        table.s_lock(&blk).unwrap();
        table.x_lock(&blk).unwrap();

        {
            let table = Arc::clone(&table);
            let blk = blk.clone();
            let reader = thread::spawn(move || table.s_lock(&blk));
            assert!(reader.join().unwrap().is_err());
        }

        table.unlock(&blk);
        table.s_lock(&blk).unwrap();
    }

    #[test]
    fn upgrade_times_out_against_other_readers() {
        let table = quick_table();
        let blk = BlockId::new("t.tbl", 1);

        // Two readers; an upgrade by either must not be granted.
        table.s_lock(&blk).unwrap();
        table.s_lock(&blk).unwrap();
        assert!(table.x_lock(&blk).is_err());
    }

    #[test]
    fn full_release_wakes_blocked_readers() {
        let table = Arc::new(LockTable::new(Duration::from_secs(5)));
        let blk = BlockId::new("t.tbl", 2);

        // Upgrade to exclusive, shutting readers out.
        table.s_lock(&blk).unwrap();
        table.x_lock(&blk).unwrap();

        let reader = {
            let table = Arc::clone(&table);
            let blk = blk.clone();
            thread::spawn(move || table.s_lock(&blk))
        };

        thread::sleep(Duration::from_millis(50));
        table.unlock(&blk);
        assert!(reader.join().unwrap().is_ok());
    }
}
