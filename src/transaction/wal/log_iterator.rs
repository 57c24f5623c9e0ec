use std::sync::Arc;

use crate::common::types::BlockId;
use crate::storage::buffer::{Buffer, BufferManager};
use crate::storage::file::FileManager;
use crate::transaction::wal::log_manager::Result;

/// Walks the log records newest-first.
///
/// Records are packed right-to-left within each block, so the iterator
/// reads forward from a block's boundary and then steps to the previous
/// block, yielding the globally newest record first and the oldest last.
///
/// One log block is pinned in the buffer pool at a time; it is unpinned
/// when the iterator advances past it, when iteration is exhausted, and on
/// drop, so abandoning the iterator early cannot leak a pin.
pub struct LogIterator {
    file_manager: Arc<FileManager>,
    buffer_manager: Arc<BufferManager>,
    blk: BlockId,
    buffer: Option<Arc<Buffer>>,
    current_pos: usize,
}

impl LogIterator {
    pub(crate) fn new(
        file_manager: Arc<FileManager>,
        buffer_manager: Arc<BufferManager>,
        tail_blk: BlockId,
    ) -> Result<Self> {
        let mut iter = Self {
            file_manager,
            buffer_manager,
            blk: tail_blk.clone(),
            buffer: None,
            current_pos: 0,
        };
        iter.move_to_block(tail_blk)?;
        Ok(iter)
    }

    fn has_next(&self) -> bool {
        self.current_pos < self.file_manager.block_size() || self.blk.number() > 0
    }

    /// Pin `blk` and position at its boundary (its most recent record).
    fn move_to_block(&mut self, blk: BlockId) -> Result<()> {
        self.release();
        let buffer = self.buffer_manager.pin(&blk)?;
        self.current_pos = buffer.contents().get_int(0) as usize;
        self.buffer = Some(buffer);
        self.blk = blk;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.buffer_manager.unpin(&buffer);
        }
    }
}

impl Iterator for LogIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            self.release();
            return None;
        }

        if self.current_pos == self.file_manager.block_size() {
            let prev = BlockId::new(self.blk.file_name().to_string(), self.blk.number() - 1);
            if let Err(err) = self.move_to_block(prev) {
                return Some(Err(err));
            }
        }

        let buffer = self.buffer.as_ref()?;
        let record = buffer.contents().get_bytes(self.current_pos).to_vec();
        self.current_pos += 4 + record.len();
        Some(Ok(record))
    }
}

impl Drop for LogIterator {
    fn drop(&mut self) {
        self.release();
    }
}
