use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::common::types::{BlockId, TxId};
use crate::storage::buffer::{Buffer, BufferManager, BufferManagerError};
use crate::storage::file::{FileManager, FileManagerError};
use crate::transaction::buffer_list::BufferList;
use crate::transaction::concurrency::{ConcurrencyManager, LockAbortError, LockTable};
use crate::transaction::recovery::RecoveryManager;
use crate::transaction::sequence::TxSequence;
use crate::transaction::wal::log_manager::LogManagerError;
use crate::transaction::wal::log_record::LogRecordError;
use crate::transaction::wal::LogManager;

/// Lock target standing for "the length of the file": `size` and `append`
/// lock this pseudo-block so growing a file serializes with readers of its
/// length.
const END_OF_FILE: i32 = -1;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("lock abort: {0}")]
    LockAbort(#[from] LockAbortError),

    #[error("buffer error: {0}")]
    Buffer(#[from] BufferManagerError),

    #[error("log error: {0}")]
    Log(#[from] LogManagerError),

    #[error("file error: {0}")]
    File(#[from] FileManagerError),

    #[error("bad log record: {0}")]
    Record(#[from] LogRecordError),

    #[error("block {0} is not pinned by this transaction")]
    BlockNotPinned(BlockId),

    #[error("buffer has no assigned block")]
    UnassignedBuffer,
}

impl TransactionError {
    /// True for the two timeout aborts, where the caller's correct response
    /// is to roll the transaction back and retry. Everything else is fatal
    /// to the statement.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            TransactionError::LockAbort(_)
                | TransactionError::Buffer(BufferManagerError::BufferAbort)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransactionError>;

/// A database transaction: the one object higher layers talk to.
///
/// Each transaction owns its recovery manager (undo logging), its
/// concurrency manager (strict 2PL over the shared lock table), a private
/// list of pinned buffers, and a note of every file it has grown so a
/// rollback can shrink them back.
///
/// Reads take a shared lock at pin time; writes upgrade to exclusive and
/// log a before-image first. All locks are held until commit or rollback.
pub struct Transaction {
    file_manager: Arc<FileManager>,
    buffer_manager: Arc<BufferManager>,
    recovery: RecoveryManager,
    concurrency: ConcurrencyManager,
    buffers: BufferList,
    tx: TxId,
    appends: HashMap<String, i32>,
}

impl Transaction {
    /// Begin a transaction: allocate a durable id and write its START
    /// record.
    pub fn new(
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        buffer_manager: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
        sequence: &TxSequence,
    ) -> Result<Self> {
        let tx = sequence.next()?;
        let recovery = RecoveryManager::new(tx, log_manager, Arc::clone(&buffer_manager))?;
        Ok(Self {
            file_manager,
            buffer_manager: Arc::clone(&buffer_manager),
            recovery,
            concurrency: ConcurrencyManager::new(lock_table),
            buffers: BufferList::new(buffer_manager),
            tx,
            appends: HashMap::new(),
        })
    }

    pub fn id(&self) -> TxId {
        self.tx
    }

    /// Pin the block for this transaction. Pinning declares at least the
    /// intent to read, so the shared lock is taken here.
    pub fn pin(&mut self, blk: &BlockId) -> Result<()> {
        self.concurrency.s_lock(blk)?;
        self.buffers.pin(blk)?;
        Ok(())
    }

    /// Release one pin. The lock stays held until commit or rollback.
    pub fn unpin(&mut self, blk: &BlockId) {
        self.buffers.unpin(blk);
    }

    pub fn get_int(&self, blk: &BlockId, offset: usize) -> Result<i32> {
        let buffer = self.pinned(blk)?;
        let val = buffer.contents().get_int(offset);
        Ok(val)
    }

    pub fn get_string(&self, blk: &BlockId, offset: usize) -> Result<String> {
        let buffer = self.pinned(blk)?;
        let val = buffer.contents().get_string(offset);
        Ok(val)
    }

    /// Write an integer at `offset` of the pinned block, upgrading to an
    /// exclusive lock and (unless this is an undo write) logging the old
    /// value first.
    pub fn set_int(&mut self, blk: &BlockId, offset: usize, val: i32, ok_to_log: bool) -> Result<()> {
        self.concurrency.x_lock(blk)?;
        let buffer = self.pinned(blk)?;
        let lsn = if ok_to_log {
            Some(self.recovery.set_int(&buffer, offset, val)?)
        } else {
            None
        };
        buffer.contents().set_int(offset, val);
        buffer.set_modified(self.tx, lsn);
        Ok(())
    }

    pub fn set_string(
        &mut self,
        blk: &BlockId,
        offset: usize,
        val: &str,
        ok_to_log: bool,
    ) -> Result<()> {
        self.concurrency.x_lock(blk)?;
        let buffer = self.pinned(blk)?;
        let lsn = if ok_to_log {
            Some(self.recovery.set_string(&buffer, offset, val)?)
        } else {
            None
        };
        buffer.contents().set_string(offset, val);
        buffer.set_modified(self.tx, lsn);
        Ok(())
    }

    /// The file's length in blocks, under a shared lock on its end-of-file
    /// marker.
    pub fn size(&mut self, filename: &str) -> Result<i32> {
        let eof = BlockId::new(filename, END_OF_FILE);
        self.concurrency.s_lock(&eof)?;
        Ok(self.file_manager.length(filename)?)
    }

    /// Grow the file by one block, under an exclusive lock on its
    /// end-of-file marker. The first append per file records the original
    /// length so rollback can truncate back to it.
    pub fn append(&mut self, filename: &str) -> Result<BlockId> {
        let eof = BlockId::new(filename, END_OF_FILE);
        self.concurrency.x_lock(&eof)?;
        if !self.appends.contains_key(filename) {
            let original = self.file_manager.length(filename)?;
            self.appends.insert(filename.to_string(), original);
        }
        Ok(self.file_manager.append(filename)?)
    }

    /// Make every change durable, then release all locks and pins.
    pub fn commit(&mut self) -> Result<()> {
        self.recovery.commit()?;
        info!("transaction {} committed", self.tx);
        self.concurrency.release();
        self.buffers.unpin_all();
        Ok(())
    }

    /// Undo every change, shrink any files this transaction grew, then
    /// release all locks and pins.
    pub fn rollback(&mut self) -> Result<()> {
        let recovery = self.recovery.clone();
        recovery.rollback(self)?;
        info!("transaction {} rolled back", self.tx);

        for (filename, original) in std::mem::take(&mut self.appends) {
            self.file_manager.truncate(&filename, original)?;
        }
        self.concurrency.release();
        self.buffers.unpin_all();
        Ok(())
    }

    /// Run startup recovery within this transaction: flush its buffers,
    /// undo every unfinished transaction in the log, and write the
    /// quiescent checkpoint.
    pub fn recover(&mut self) -> Result<()> {
        self.buffer_manager.flush_all(self.tx)?;
        let recovery = self.recovery.clone();
        recovery.recover(self)
    }

    pub fn block_size(&self) -> usize {
        self.file_manager.block_size()
    }

    pub fn available_buffs(&self) -> usize {
        self.buffer_manager.available()
    }

    fn pinned(&self, blk: &BlockId) -> Result<Arc<Buffer>> {
        self.buffers
            .get(blk)
            .ok_or_else(|| TransactionError::BlockNotPinned(blk.clone()))
    }
}
