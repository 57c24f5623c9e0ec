use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use thiserror::Error;

use crate::storage::buffer::BufferManager;
use crate::storage::file::{FileManager, FileManagerError};
use crate::transaction::concurrency::LockTable;
use crate::transaction::sequence::TxSequence;
use crate::transaction::transaction::{Transaction, TransactionError};
use crate::transaction::wal::log_manager::LogManagerError;
use crate::transaction::wal::LogManager;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("file error: {0}")]
    File(#[from] FileManagerError),

    #[error("log error: {0}")]
    Log(#[from] LogManagerError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// Everything the engine core needs to know at startup.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory holding every block file, the log, and the id sequence.
    pub db_dir: PathBuf,

    /// Size of every block in every file, in bytes.
    pub block_size: usize,

    /// Number of buffers in the pool.
    pub pool_size: usize,

    /// Name of the log file inside `db_dir`.
    pub log_file: String,

    /// How long a lock request waits before aborting.
    pub lock_wait: Duration,

    /// How long a pin request waits for a free buffer before aborting.
    pub pin_wait: Duration,
}

impl DatabaseConfig {
    pub fn new(db_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_dir: db_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("burandb"),
            block_size: 400,
            pool_size: 8,
            log_file: "burandb.log".to_string(),
            lock_wait: Duration::from_secs(10),
            pin_wait: Duration::from_secs(10),
        }
    }
}

/// The engine root: owns the shared services and hands out transactions.
///
/// Construction order matters: the log manager is built against the file
/// manager alone, the buffer pool is built over both, and only then is the
/// pool attached to the log manager, which pins the log tail. The lock
/// table and the id sequence are plain fields here: process-wide state,
/// but explicitly constructed and passed around, never ambient.
pub struct Database {
    file_manager: Arc<FileManager>,
    log_manager: Arc<LogManager>,
    buffer_manager: Arc<BufferManager>,
    lock_table: Arc<LockTable>,
    sequence: Arc<TxSequence>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Result<Self, DatabaseError> {
        let file_manager = Arc::new(FileManager::new(&config.db_dir, config.block_size)?);
        let log_manager = Arc::new(LogManager::new(
            Arc::clone(&file_manager),
            config.log_file.clone(),
        )?);
        let buffer_manager = Arc::new(BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            config.pool_size,
            config.pin_wait,
        ));
        log_manager.attach_buffer_manager(Arc::clone(&buffer_manager))?;

        let sequence = Arc::new(TxSequence::new(Arc::clone(&file_manager)));
        Ok(Self {
            file_manager,
            log_manager,
            buffer_manager,
            lock_table: Arc::new(LockTable::new(config.lock_wait)),
            sequence,
        })
    }

    /// Begin a new transaction.
    pub fn new_tx(&self) -> Result<Transaction, TransactionError> {
        Transaction::new(
            Arc::clone(&self.file_manager),
            Arc::clone(&self.log_manager),
            Arc::clone(&self.buffer_manager),
            Arc::clone(&self.lock_table),
            &self.sequence,
        )
    }

    /// Startup recovery: undo whatever the last run left unfinished and
    /// mark the log with a quiescent checkpoint. Run this before any user
    /// transaction.
    pub fn recover(&self) -> Result<(), TransactionError> {
        info!("running startup recovery");
        let mut tx = self.new_tx()?;
        tx.recover()?;
        tx.commit()?;
        Ok(())
    }

    pub fn file_manager(&self) -> &Arc<FileManager> {
        &self.file_manager
    }

    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.log_manager
    }

    pub fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.buffer_manager
    }
}
