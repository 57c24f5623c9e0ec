use std::fmt;

use thiserror::Error;

use crate::common::types::{BlockId, TxId};
use crate::storage::file::Page;
use crate::transaction::transaction::{Transaction, TransactionError};

/// Op codes, stored as the first 4 bytes of every log record.
pub const CHECKPOINT: i32 = 0;
pub const START: i32 = 1;
pub const COMMIT: i32 = 2;
pub const ROLLBACK: i32 = 3;
pub const SETINT: i32 = 4;
pub const SETSTRING: i32 = 5;

#[derive(Error, Debug)]
pub enum LogRecordError {
    #[error("log record too short to contain an op code")]
    Truncated,

    #[error("unknown log record op code {0}")]
    UnknownOp(i32),
}

/// One record of the write-ahead log: either a transaction lifecycle marker
/// or the before-image of a single value, carrying everything undo needs.
///
/// Wire format: a 32-bit big-endian op code followed by the payload fields
/// in declaration order; strings are length-prefixed ASCII.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Checkpoint,
    Start {
        tx: TxId,
    },
    Commit {
        tx: TxId,
    },
    Rollback {
        tx: TxId,
    },
    SetInt {
        tx: TxId,
        blk: BlockId,
        offset: usize,
        old_val: i32,
    },
    SetString {
        tx: TxId,
        blk: BlockId,
        offset: usize,
        old_val: String,
    },
}

impl LogRecord {
    pub fn op(&self) -> i32 {
        match self {
            LogRecord::Checkpoint => CHECKPOINT,
            LogRecord::Start { .. } => START,
            LogRecord::Commit { .. } => COMMIT,
            LogRecord::Rollback { .. } => ROLLBACK,
            LogRecord::SetInt { .. } => SETINT,
            LogRecord::SetString { .. } => SETSTRING,
        }
    }

    /// The transaction this record belongs to; checkpoints belong to none.
    pub fn tx_number(&self) -> Option<TxId> {
        match self {
            LogRecord::Checkpoint => None,
            LogRecord::Start { tx }
            | LogRecord::Commit { tx }
            | LogRecord::Rollback { tx }
            | LogRecord::SetInt { tx, .. }
            | LogRecord::SetString { tx, .. } => Some(*tx),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            LogRecord::Checkpoint => {
                let mut page = Page::from_bytes(vec![0; 4]);
                page.set_int(0, CHECKPOINT);
                page.into_bytes()
            }
            LogRecord::Start { tx } | LogRecord::Commit { tx } | LogRecord::Rollback { tx } => {
                let mut page = Page::from_bytes(vec![0; 8]);
                page.set_int(0, self.op());
                page.set_int(4, *tx);
                page.into_bytes()
            }
            LogRecord::SetInt {
                tx,
                blk,
                offset,
                old_val,
            } => {
                let (bpos, opos, vpos) = Self::update_positions(blk);
                let mut page = Page::from_bytes(vec![0; vpos + 4]);
                page.set_int(0, SETINT);
                page.set_int(4, *tx);
                page.set_string(8, blk.file_name());
                page.set_int(bpos, blk.number());
                page.set_int(opos, *offset as i32);
                page.set_int(vpos, *old_val);
                page.into_bytes()
            }
            LogRecord::SetString {
                tx,
                blk,
                offset,
                old_val,
            } => {
                let (bpos, opos, vpos) = Self::update_positions(blk);
                let mut page = Page::from_bytes(vec![0; vpos + Page::max_length(old_val.len())]);
                page.set_int(0, SETSTRING);
                page.set_int(4, *tx);
                page.set_string(8, blk.file_name());
                page.set_int(bpos, blk.number());
                page.set_int(opos, *offset as i32);
                page.set_string(vpos, old_val);
                page.into_bytes()
            }
        }
    }

    /// Decode a record previously produced by [`encode`](Self::encode).
    /// The payload itself is trusted; only the op code is validated.
    pub fn decode(bytes: &[u8]) -> Result<Self, LogRecordError> {
        if bytes.len() < 4 {
            return Err(LogRecordError::Truncated);
        }
        let page = Page::from_bytes(bytes.to_vec());
        let op = page.get_int(0);
        let record = match op {
            CHECKPOINT => LogRecord::Checkpoint,
            START => LogRecord::Start { tx: page.get_int(4) },
            COMMIT => LogRecord::Commit { tx: page.get_int(4) },
            ROLLBACK => LogRecord::Rollback { tx: page.get_int(4) },
            SETINT | SETSTRING => {
                let tx = page.get_int(4);
                let filename = page.get_string(8);
                let bpos = 8 + Page::max_length(filename.len());
                let blk = BlockId::new(filename, page.get_int(bpos));
                let offset = page.get_int(bpos + 4) as usize;
                if op == SETINT {
                    LogRecord::SetInt {
                        tx,
                        blk,
                        offset,
                        old_val: page.get_int(bpos + 8),
                    }
                } else {
                    LogRecord::SetString {
                        tx,
                        blk,
                        offset,
                        old_val: page.get_string(bpos + 8),
                    }
                }
            }
            other => return Err(LogRecordError::UnknownOp(other)),
        };
        Ok(record)
    }

    /// Restore the before-image this record carries, through the given
    /// transaction: pin the block, write the saved value without logging,
    /// unpin. Lifecycle records undo nothing.
    pub fn undo(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        match self {
            LogRecord::SetInt {
                blk,
                offset,
                old_val,
                ..
            } => {
                tx.pin(blk)?;
                tx.set_int(blk, *offset, *old_val, false)?;
                tx.unpin(blk);
            }
            LogRecord::SetString {
                blk,
                offset,
                old_val,
                ..
            } => {
                tx.pin(blk)?;
                tx.set_string(blk, *offset, old_val, false)?;
                tx.unpin(blk);
            }
            _ => {}
        }
        Ok(())
    }

    fn update_positions(blk: &BlockId) -> (usize, usize, usize) {
        let bpos = 8 + Page::max_length(blk.file_name().len());
        (bpos, bpos + 4, bpos + 8)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRecord::Checkpoint => write!(f, "<CHECKPOINT>"),
            LogRecord::Start { tx } => write!(f, "<START {tx}>"),
            LogRecord::Commit { tx } => write!(f, "<COMMIT {tx}>"),
            LogRecord::Rollback { tx } => write!(f, "<ROLLBACK {tx}>"),
            LogRecord::SetInt {
                tx,
                blk,
                offset,
                old_val,
            } => write!(f, "<SETINT {tx} {blk} {offset} {old_val}>"),
            LogRecord::SetString {
                tx,
                blk,
                offset,
                old_val,
            } => write!(f, "<SETSTRING {tx} {blk} {offset} {old_val}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_records_round_trip() {
        for record in [
            LogRecord::Checkpoint,
            LogRecord::Start { tx: 7 },
            LogRecord::Commit { tx: 7 },
            LogRecord::Rollback { tx: 8 },
        ] {
            let decoded = LogRecord::decode(&record.encode()).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn set_int_round_trip_and_layout() {
        let record = LogRecord::SetInt {
            tx: 3,
            blk: BlockId::new("t.tbl", 2),
            offset: 80,
            old_val: 7,
        };
        let bytes = record.encode();

        // Op code leads, transaction id follows.
        let page = Page::from_bytes(bytes.clone());
        assert_eq!(page.get_int(0), SETINT);
        assert_eq!(page.get_int(4), 3);

        assert_eq!(LogRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn set_string_round_trip() {
        let record = LogRecord::SetString {
            tx: 12,
            blk: BlockId::new("names.tbl", 0),
            offset: 16,
            old_val: "before".to_string(),
        };
        assert_eq!(LogRecord::decode(&record.encode()).unwrap(), record);
    }

    #[test]
    fn bad_records_are_rejected() {
        assert!(matches!(
            LogRecord::decode(&[0, 0]),
            Err(LogRecordError::Truncated)
        ));

        let mut page = Page::from_bytes(vec![0; 4]);
        page.set_int(0, 42);
        assert!(matches!(
            LogRecord::decode(&page.into_bytes()),
            Err(LogRecordError::UnknownOp(42))
        ));
    }

    #[test]
    fn display_matches_record_contents() {
        let record = LogRecord::SetInt {
            tx: 2,
            blk: BlockId::new("t.tbl", 0),
            offset: 80,
            old_val: 7,
        };
        assert_eq!(record.to_string(), "<SETINT 2 [file t.tbl, block 0] 80 7>");
    }
}
