use std::collections::HashMap;
use std::sync::Arc;

use crate::common::types::BlockId;
use crate::storage::buffer::{Buffer, BufferManager, BufferManagerError};

/// The transaction's private ledger of pinned buffers.
///
/// The pool knows pin counts but not owners; this list is what lets a
/// transaction hand back every pin it still holds at commit or rollback.
/// A block pinned twice appears twice in `pins` and once in `buffers`.
pub(crate) struct BufferList {
    buffers: HashMap<BlockId, Arc<Buffer>>,
    pins: Vec<BlockId>,
    buffer_manager: Arc<BufferManager>,
}

impl BufferList {
    pub(crate) fn new(buffer_manager: Arc<BufferManager>) -> Self {
        Self {
            buffers: HashMap::new(),
            pins: Vec::new(),
            buffer_manager,
        }
    }

    /// The buffer this transaction has pinned to `blk`, if any.
    pub(crate) fn get(&self, blk: &BlockId) -> Option<Arc<Buffer>> {
        self.buffers.get(blk).cloned()
    }

    pub(crate) fn pin(&mut self, blk: &BlockId) -> Result<(), BufferManagerError> {
        let buffer = self.buffer_manager.pin(blk)?;
        self.buffers.insert(blk.clone(), buffer);
        self.pins.push(blk.clone());
        Ok(())
    }

    pub(crate) fn unpin(&mut self, blk: &BlockId) {
        if let Some(buffer) = self.buffers.get(blk) {
            self.buffer_manager.unpin(buffer);
            if let Some(pos) = self.pins.iter().position(|b| b == blk) {
                self.pins.remove(pos);
            }
            if !self.pins.contains(blk) {
                self.buffers.remove(blk);
            }
        }
    }

    /// Hand back every pin still held.
    pub(crate) fn unpin_all(&mut self) {
        for blk in &self.pins {
            if let Some(buffer) = self.buffers.get(blk) {
                self.buffer_manager.unpin(buffer);
            }
        }
        self.buffers.clear();
        self.pins.clear();
    }
}
