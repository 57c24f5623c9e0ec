use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{BlockId, TxId};
use crate::storage::buffer::buffer::Buffer;
use crate::storage::buffer::error::BufferManagerError;
use crate::storage::file::FileManager;
use crate::transaction::wal::log_manager::LogManager;

pub type Result<T> = std::result::Result<T, BufferManagerError>;

struct PoolState {
    num_available: usize,
    clock_hand: usize,
    block_map: HashMap<BlockId, usize>,
}

/// The buffer pool: a fixed set of buffers that blocks are pinned into,
/// with clock-based victim selection and bounded waiting when every buffer
/// is pinned.
///
/// Pool metadata (the block map, the available count, and the clock hand)
/// lives under one mutex; waiting pinners park on a condvar against it and
/// give up with [`BufferManagerError::BufferAbort`] after `max_wait`.
pub struct BufferManager {
    pool: Vec<Arc<Buffer>>,
    state: Mutex<PoolState>,
    available_cond: Condvar,
    max_wait: Duration,
}

impl BufferManager {
    pub fn new(
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        pool_size: usize,
        max_wait: Duration,
    ) -> Self {
        let pool = (0..pool_size)
            .map(|_| {
                Arc::new(Buffer::new(
                    Arc::clone(&file_manager),
                    Arc::clone(&log_manager),
                ))
            })
            .collect();
        Self {
            pool,
            state: Mutex::new(PoolState {
                num_available: pool_size,
                clock_hand: 0,
                block_map: HashMap::new(),
            }),
            available_cond: Condvar::new(),
            max_wait,
        }
    }

    /// Pin the block into a buffer, reusing the buffer that already holds
    /// it if there is one. When every buffer is pinned, waits up to
    /// `max_wait` for an unpin before failing with `BufferAbort`.
    pub fn pin(&self, blk: &BlockId) -> Result<Arc<Buffer>> {
        let deadline = Instant::now() + self.max_wait;
        let mut state = self.state.lock();
        loop {
            if let Some(buffer) = self.try_to_pin(&mut state, blk)? {
                return Ok(buffer);
            }
            if self.available_cond.wait_until(&mut state, deadline).timed_out() {
                warn!("giving up pinning {blk}: no buffer freed in {:?}", self.max_wait);
                return Err(BufferManagerError::BufferAbort);
            }
        }
    }

    /// Release one pin on the buffer. When the pin count reaches zero the
    /// buffer becomes evictable and waiting pinners are woken.
    pub fn unpin(&self, buffer: &Arc<Buffer>) {
        let mut state = self.state.lock();
        buffer.unpin();
        if !buffer.is_pinned() {
            state.num_available += 1;
            self.available_cond.notify_all();
        }
    }

    /// Flush every buffer whose pending modifications belong to `tx`.
    pub fn flush_all(&self, tx: TxId) -> Result<()> {
        let _state = self.state.lock();
        for buffer in &self.pool {
            if buffer.modifying_tx() == Some(tx) {
                buffer.flush()?;
            }
        }
        Ok(())
    }

    /// The number of currently unpinned buffers.
    pub fn available(&self) -> usize {
        self.state.lock().num_available
    }

    fn try_to_pin(&self, state: &mut PoolState, blk: &BlockId) -> Result<Option<Arc<Buffer>>> {
        let slot = match state.block_map.get(blk) {
            Some(&slot) => Some(slot),
            None => match self.choose_unpinned(state) {
                Some(slot) => {
                    let buffer = &self.pool[slot];
                    if let Some(old) = buffer.block() {
                        state.block_map.remove(&old);
                    }
                    buffer.assign_to_block(blk.clone())?;
                    state.block_map.insert(blk.clone(), slot);
                    Some(slot)
                }
                None => None,
            },
        };

        Ok(slot.map(|slot| {
            let buffer = &self.pool[slot];
            if !buffer.is_pinned() {
                state.num_available -= 1;
            }
            buffer.pin();
            Arc::clone(buffer)
        }))
    }

    /// One circular sweep from the clock hand; takes the first unpinned
    /// buffer and leaves the hand just past it.
    fn choose_unpinned(&self, state: &mut PoolState) -> Option<usize> {
        for i in 0..self.pool.len() {
            let slot = (state.clock_hand + i) % self.pool.len();
            if !self.pool[slot].is_pinned() {
                state.clock_hand = (slot + 1) % self.pool.len();
                return Some(slot);
            }
        }
        None
    }
}
