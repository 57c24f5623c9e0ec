use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::common::types::{BlockId, Lsn, TxId};
use crate::storage::buffer::error::BufferManagerError;
use crate::storage::file::{FileManager, Page};
use crate::transaction::wal::log_manager::LogManager;

struct BufferInner {
    page: Page,
    block: Option<BlockId>,
    pins: u32,
    modifying_tx: Option<TxId>,
    lsn: Option<Lsn>,
}

/// One slot of the buffer pool: a page plus its status. The status is the
/// block the page holds, its pin count, and, if the page has unflushed
/// modifications, the id of the modifying transaction and the LSN of the
/// log record covering the latest change.
///
/// The slot carries its own lock so that flushing one buffer (which may do
/// log and file I/O) does not serialize readers of other buffers.
pub struct Buffer {
    file_manager: Arc<FileManager>,
    log_manager: Arc<LogManager>,
    inner: Mutex<BufferInner>,
}

impl Buffer {
    pub(crate) fn new(file_manager: Arc<FileManager>, log_manager: Arc<LogManager>) -> Self {
        let page = Page::new(file_manager.block_size());
        Self {
            file_manager,
            log_manager,
            inner: Mutex::new(BufferInner {
                page,
                block: None,
                pins: 0,
                modifying_tx: None,
                lsn: None,
            }),
        }
    }

    /// Locked access to the buffer's page. Hold the guard only for the
    /// read or write at hand.
    pub fn contents(&self) -> MappedMutexGuard<'_, Page> {
        MutexGuard::map(self.inner.lock(), |inner| &mut inner.page)
    }

    /// The block currently assigned to this buffer, if any.
    pub fn block(&self) -> Option<BlockId> {
        self.inner.lock().block.clone()
    }

    pub fn is_pinned(&self) -> bool {
        self.inner.lock().pins > 0
    }

    pub fn modifying_tx(&self) -> Option<TxId> {
        self.inner.lock().modifying_tx
    }

    /// Record that `tx` modified the page. `lsn` is the log record covering
    /// the change, or `None` for unlogged writes (undo application), which
    /// keep whatever LSN is already recorded.
    pub fn set_modified(&self, tx: TxId, lsn: Option<Lsn>) {
        let mut inner = self.inner.lock();
        inner.modifying_tx = Some(tx);
        if lsn.is_some() {
            inner.lsn = lsn;
        }
    }

    pub(crate) fn pin(&self) {
        self.inner.lock().pins += 1;
    }

    pub(crate) fn unpin(&self) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.pins > 0, "unpin of an unpinned buffer");
        inner.pins -= 1;
    }

    /// Point this buffer at a different block: flush the old contents if
    /// dirty, then read the new block in. Resets the pin count.
    pub(crate) fn assign_to_block(&self, blk: BlockId) -> Result<(), BufferManagerError> {
        let mut inner = self.inner.lock();
        Self::flush_inner(&self.file_manager, &self.log_manager, &mut inner)?;
        self.file_manager.read(&blk, &mut inner.page)?;
        inner.block = Some(blk);
        inner.pins = 0;
        Ok(())
    }

    /// Write the page to disk if it has unflushed modifications. The log is
    /// flushed through the recorded LSN first (the write-ahead rule).
    pub(crate) fn flush(&self) -> Result<(), BufferManagerError> {
        let mut inner = self.inner.lock();
        Self::flush_inner(&self.file_manager, &self.log_manager, &mut inner)
    }

    fn flush_inner(
        file_manager: &FileManager,
        log_manager: &LogManager,
        inner: &mut BufferInner,
    ) -> Result<(), BufferManagerError> {
        if inner.modifying_tx.is_none() {
            return Ok(());
        }
        if let Some(lsn) = inner.lsn {
            log_manager.flush(lsn)?;
        }
        if let Some(blk) = &inner.block {
            file_manager.write(blk, &inner.page)?;
        }
        inner.modifying_tx = None;
        Ok(())
    }
}
