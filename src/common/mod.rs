pub mod types;

pub use types::{BlockId, Lsn, TxId};
