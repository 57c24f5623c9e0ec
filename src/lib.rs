// Export public modules
pub mod common;
pub mod database;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use common::types::{BlockId, Lsn, TxId};
pub use database::{Database, DatabaseConfig, DatabaseError};
pub use storage::buffer::{Buffer, BufferManager, BufferManagerError};
pub use storage::file::{FileManager, Page};
pub use transaction::{LockAbortError, LockTable, Transaction, TransactionError};
