use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use burandb::{Database, DatabaseConfig};

// Test databases use the classic teaching dimensions (400-byte blocks,
// 8 buffers) but much shorter abort deadlines, so timeout scenarios run in
// milliseconds instead of tens of seconds.
#[allow(dead_code)]
pub fn test_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        db_dir: dir.path().join("db"),
        block_size: 400,
        pool_size: 8,
        log_file: "test.log".to_string(),
        lock_wait: Duration::from_millis(250),
        pin_wait: Duration::from_millis(250),
    }
}

// Create a database in a fresh temporary directory.
#[allow(dead_code)]
pub fn create_test_db() -> Result<(Database, TempDir)> {
    let dir = TempDir::new()?;
    let db = Database::new(test_config(&dir))?;
    Ok((db, dir))
}
