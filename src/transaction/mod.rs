mod buffer_list;
pub mod concurrency;
pub mod recovery;
pub mod sequence;
pub mod transaction;
pub mod wal;

pub use concurrency::{ConcurrencyManager, LockAbortError, LockTable};
pub use recovery::RecoveryManager;
pub use sequence::TxSequence;
pub use transaction::{Transaction, TransactionError};
pub use wal::{LogManager, LogRecord};
