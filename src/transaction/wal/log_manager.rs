use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::common::types::{BlockId, Lsn};
use crate::storage::buffer::{Buffer, BufferManager, BufferManagerError};
use crate::storage::file::{FileManager, FileManagerError, Page};
use crate::transaction::wal::log_iterator::LogIterator;

#[derive(Error, Debug)]
pub enum LogManagerError {
    #[error("file error: {0}")]
    File(#[from] FileManagerError),

    #[error("buffer error: {0}")]
    Buffer(Box<BufferManagerError>),

    #[error("log manager used before a buffer manager was attached")]
    Detached,
}

// Boxed by hand; see the note on `BufferManagerError::Log`.
impl From<BufferManagerError> for LogManagerError {
    fn from(err: BufferManagerError) -> Self {
        LogManagerError::Buffer(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LogManagerError>;

struct LogTail {
    blk: BlockId,
    // Weak: the pool owns its buffers and every buffer holds the log
    // manager, so a strong reference here would tie the two managers into
    // a cycle neither could ever drop out of.
    buffer: Option<Weak<Buffer>>,
}

/// The durable, append-only history of the database.
///
/// The log file is a sequence of blocks whose first 4 bytes hold the
/// `boundary`: the offset of the most recently written record. Records are
/// packed right-to-left from the block's tail toward the boundary, each as
/// `[i32 length][bytes]`, so a forward scan within a block reads records
/// newest-first, the only order recovery ever wants.
///
/// The tail block is pinned in the buffer pool, attached after both
/// managers exist (the pool's buffers in turn flush through this manager).
/// Writing the tail to disk therefore goes straight through the file
/// manager, never back through the buffer flush path.
pub struct LogManager {
    file_manager: Arc<FileManager>,
    log_file: String,
    /// Serializes appenders; the tail lock alone is held too briefly to.
    append_lock: Mutex<()>,
    tail: RwLock<LogTail>,
    buffer_manager: RwLock<Option<Weak<BufferManager>>>,
    latest_lsn: AtomicU64,
    last_saved_lsn: AtomicU64,
}

impl LogManager {
    /// Create the manager for `log_file`. An empty log gets a fresh first
    /// block; otherwise the last existing block is adopted as the tail.
    pub fn new(file_manager: Arc<FileManager>, log_file: impl Into<String>) -> Result<Self> {
        let log_file = log_file.into();
        let log_blocks = file_manager.length(&log_file)?;
        let blk = if log_blocks == 0 {
            Self::append_fresh_block(&file_manager, &log_file)?
        } else {
            BlockId::new(log_file.clone(), log_blocks - 1)
        };

        Ok(Self {
            file_manager,
            log_file,
            append_lock: Mutex::new(()),
            tail: RwLock::new(LogTail { blk, buffer: None }),
            buffer_manager: RwLock::new(None),
            latest_lsn: AtomicU64::new(0),
            last_saved_lsn: AtomicU64::new(0),
        })
    }

    /// Hand the manager its buffer pool and pin the tail block there.
    /// Appending or iterating before this call fails with [`LogManagerError::Detached`].
    pub fn attach_buffer_manager(&self, buffer_manager: Arc<BufferManager>) -> Result<()> {
        let blk = self.tail.read().blk.clone();
        let buffer = buffer_manager.pin(&blk)?;
        *self.buffer_manager.write() = Some(Arc::downgrade(&buffer_manager));
        self.tail.write().buffer = Some(Arc::downgrade(&buffer));
        Ok(())
    }

    /// Append one opaque record and return its LSN. If the record does not
    /// fit in front of the current block's boundary header, the block is
    /// flushed and a fresh one becomes the tail.
    pub fn append(&self, record: &[u8]) -> Result<Lsn> {
        let _serialize = self.append_lock.lock();

        let block_size = self.file_manager.block_size();
        let bytes_needed = record.len() + 4;
        assert!(
            bytes_needed + 4 <= block_size,
            "log record of {} bytes cannot fit in a {} byte block",
            record.len(),
            block_size
        );

        let mut buffer = self.tail_buffer()?;
        let mut boundary = buffer.contents().get_int(0) as usize;

        if boundary < bytes_needed + 4 {
            // The record would overlap the boundary header: grow the log.
            self.write_tail()?;
            let blk = Self::append_fresh_block(&self.file_manager, &self.log_file)?;
            let buffer_manager = self.buffer_manager()?;
            buffer_manager.unpin(&buffer);
            buffer = buffer_manager.pin(&blk)?;
            *self.tail.write() = LogTail {
                blk,
                buffer: Some(Arc::downgrade(&buffer)),
            };
            boundary = buffer.contents().get_int(0) as usize;
        }

        let recpos = boundary - bytes_needed;
        {
            let mut page = buffer.contents();
            page.set_bytes(recpos, record);
            page.set_int(0, recpos as i32);
        }
        Ok(self.latest_lsn.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Ensure the record with the given LSN (and everything before it) is
    /// on disk.
    pub fn flush(&self, lsn: Lsn) -> Result<()> {
        if lsn >= self.last_saved_lsn.load(Ordering::SeqCst) {
            self.write_tail()?;
        }
        Ok(())
    }

    /// A newest-first iterator over every record in the log. The log is
    /// flushed first so the iterator sees the in-memory tail.
    pub fn iterator(&self) -> Result<LogIterator> {
        self.write_tail()?;
        let blk = self.tail.read().blk.clone();
        LogIterator::new(
            Arc::clone(&self.file_manager),
            self.buffer_manager()?,
            blk,
        )
    }

    /// The LSN handed out by the most recent append.
    pub fn latest_lsn(&self) -> Lsn {
        self.latest_lsn.load(Ordering::SeqCst)
    }

    /// Write the tail block to disk through the file manager. This is the
    /// one write path that must not go through `Buffer::flush`, which would
    /// call back into this manager.
    fn write_tail(&self) -> Result<()> {
        let tail = self.tail.read();
        let buffer = tail
            .buffer
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(LogManagerError::Detached)?;
        self.file_manager.write(&tail.blk, &buffer.contents())?;
        self.last_saved_lsn
            .store(self.latest_lsn.load(Ordering::SeqCst), Ordering::SeqCst);
        Ok(())
    }

    /// Extend the log file by one block whose boundary marks it empty.
    fn append_fresh_block(file_manager: &FileManager, log_file: &str) -> Result<BlockId> {
        let blk = file_manager.append(log_file)?;
        let mut page = Page::new(file_manager.block_size());
        page.set_int(0, file_manager.block_size() as i32);
        file_manager.write(&blk, &page)?;
        Ok(blk)
    }

    fn tail_buffer(&self) -> Result<Arc<Buffer>> {
        self.tail
            .read()
            .buffer
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(LogManagerError::Detached)
    }

    fn buffer_manager(&self) -> Result<Arc<BufferManager>> {
        self.buffer_manager
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(LogManagerError::Detached)
    }
}
