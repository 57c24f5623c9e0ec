use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use crate::common::types::{Lsn, TxId};
use crate::storage::buffer::{Buffer, BufferManager};
use crate::transaction::transaction::{Transaction, TransactionError};
use crate::transaction::wal::log_record::LogRecord;
use crate::transaction::wal::LogManager;

pub type Result<T> = std::result::Result<T, TransactionError>;

/// The per-transaction recovery manager: emits the undo information for
/// every change the transaction makes, and drives commit, rollback, and
/// startup recovery.
///
/// Cloning is cheap (two `Arc`s and an id); `Transaction` clones its
/// manager before rollback and recovery so the manager can drive undo
/// through the transaction it lives in.
#[derive(Clone)]
pub struct RecoveryManager {
    log_manager: Arc<LogManager>,
    buffer_manager: Arc<BufferManager>,
    tx: TxId,
}

impl RecoveryManager {
    /// Create the manager for transaction `tx`, writing its START record.
    pub fn new(
        tx: TxId,
        log_manager: Arc<LogManager>,
        buffer_manager: Arc<BufferManager>,
    ) -> Result<Self> {
        log_manager.append(&LogRecord::Start { tx }.encode())?;
        Ok(Self {
            log_manager,
            buffer_manager,
            tx,
        })
    }

    /// Log the before-image for an integer about to be written at `offset`
    /// of the buffer's page, returning the record's LSN. The caller writes
    /// the new value and marks the buffer modified.
    pub fn set_int(&self, buffer: &Arc<Buffer>, offset: usize, new_val: i32) -> Result<Lsn> {
        let blk = buffer.block().ok_or(TransactionError::UnassignedBuffer)?;
        let old_val = buffer.contents().get_int(offset);
        debug!(
            "tx {} overwriting {old_val} with {new_val} at offset {offset} of {blk}",
            self.tx
        );
        let record = LogRecord::SetInt {
            tx: self.tx,
            blk,
            offset,
            old_val,
        };
        Ok(self.log_manager.append(&record.encode())?)
    }

    /// String counterpart of [`set_int`](Self::set_int).
    pub fn set_string(&self, buffer: &Arc<Buffer>, offset: usize, new_val: &str) -> Result<Lsn> {
        let blk = buffer.block().ok_or(TransactionError::UnassignedBuffer)?;
        let old_val = buffer.contents().get_string(offset);
        debug!(
            "tx {} overwriting {old_val:?} with {new_val:?} at offset {offset} of {blk}",
            self.tx
        );
        let record = LogRecord::SetString {
            tx: self.tx,
            blk,
            offset,
            old_val,
        };
        Ok(self.log_manager.append(&record.encode())?)
    }

    /// Make the transaction durable: flush its dirty buffers, append the
    /// COMMIT record, and flush the log through it.
    pub fn commit(&self) -> Result<()> {
        self.buffer_manager.flush_all(self.tx)?;
        let lsn = self.log_manager.append(&LogRecord::Commit { tx: self.tx }.encode())?;
        self.log_manager.flush(lsn)?;
        Ok(())
    }

    /// Undo everything the transaction changed, newest change first, then
    /// log the ROLLBACK record and flush.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<()> {
        for record in self.records_to_roll_back()? {
            debug!("tx {} undoing {record}", self.tx);
            record.undo(tx)?;
        }
        self.buffer_manager.flush_all(self.tx)?;
        let lsn = self
            .log_manager
            .append(&LogRecord::Rollback { tx: self.tx }.encode())?;
        self.log_manager.flush(lsn)?;
        Ok(())
    }

    /// Startup recovery: undo every change made by a transaction that
    /// neither committed nor rolled back, then mark the log with a
    /// quiescent CHECKPOINT.
    ///
    /// A rolled-back transaction counts as finished: its changes were
    /// already undone when it rolled back, so re-applying its before-images
    /// would be wasted work.
    pub fn recover(&self, tx: &mut Transaction) -> Result<()> {
        let unfinished = self.records_to_recover()?;
        info!(
            "recovery undoing {} record(s) from unfinished transactions",
            unfinished.len()
        );
        for record in unfinished {
            debug!("recovery undoing {record}");
            record.undo(tx)?;
        }
        self.buffer_manager.flush_all(self.tx)?;
        let lsn = self.log_manager.append(&LogRecord::Checkpoint.encode())?;
        self.log_manager.flush(lsn)?;
        Ok(())
    }

    /// This transaction's records, newest first, back to (and excluding)
    /// its START. Collected before undo starts so the log iterator's pin is
    /// released before undo begins pinning data blocks.
    fn records_to_roll_back(&self) -> Result<Vec<LogRecord>> {
        let mut records = Vec::new();
        for bytes in self.log_manager.iterator()? {
            let record = LogRecord::decode(&bytes?)?;
            if record.tx_number() != Some(self.tx) {
                continue;
            }
            if let LogRecord::Start { .. } = record {
                break;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// All records of unfinished transactions, newest first, stopping at
    /// the most recent CHECKPOINT.
    fn records_to_recover(&self) -> Result<Vec<LogRecord>> {
        let mut finished: HashSet<TxId> = HashSet::new();
        let mut records = Vec::new();
        for bytes in self.log_manager.iterator()? {
            let record = LogRecord::decode(&bytes?)?;
            match &record {
                LogRecord::Checkpoint => break,
                LogRecord::Commit { tx } | LogRecord::Rollback { tx } => {
                    finished.insert(*tx);
                }
                _ => {
                    if let Some(tx) = record.tx_number() {
                        if !finished.contains(&tx) {
                            records.push(record);
                        }
                    }
                }
            }
        }
        Ok(records)
    }
}
