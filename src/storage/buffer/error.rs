use thiserror::Error;

use crate::storage::file::FileManagerError;
use crate::transaction::wal::log_manager::LogManagerError;

#[derive(Error, Debug)]
pub enum BufferManagerError {
    /// No buffer became available within the pin deadline. The transaction
    /// holding this error should roll back.
    #[error("timed out waiting for a free buffer")]
    BufferAbort,

    #[error("file error: {0}")]
    File(#[from] FileManagerError),

    #[error("log error: {0}")]
    Log(Box<LogManagerError>),
}

// Boxed by hand: this variant and `LogManagerError::Buffer` reference each
// other (the log tail lives in the buffer pool, and buffer flushes go
// through the log), so one side must be indirected.
impl From<LogManagerError> for BufferManagerError {
    fn from(err: LogManagerError) -> Self {
        BufferManagerError::Log(Box::new(err))
    }
}
