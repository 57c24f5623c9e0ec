use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use burandb::transaction::wal::LogManager;
use burandb::{BlockId, BufferManager, BufferManagerError, FileManager};

mod common;
use common::create_test_db;

// A bare three-buffer pool, unattached to the log so every slot is
// available to the test.
fn three_buffer_pool() -> Result<(Arc<FileManager>, Arc<BufferManager>, TempDir)> {
    let dir = TempDir::new()?;
    let fm = Arc::new(FileManager::new(dir.path().join("db"), 400)?);
    let lm = Arc::new(LogManager::new(Arc::clone(&fm), "test.log")?);
    let bm = Arc::new(BufferManager::new(
        Arc::clone(&fm),
        lm,
        3,
        Duration::from_millis(250),
    ));
    for _ in 0..4 {
        fm.append("testfile")?;
    }
    Ok((fm, bm, dir))
}

#[test]
fn pin_aborts_when_pool_is_full_and_recovers_after_unpin() -> Result<()> {
    let (_fm, bm, _dir) = three_buffer_pool()?;

    let b0 = bm.pin(&BlockId::new("testfile", 0))?;
    let b1 = bm.pin(&BlockId::new("testfile", 1))?;
    let b2 = bm.pin(&BlockId::new("testfile", 2))?;
    assert_eq!(bm.available(), 0);

    let err = bm
        .pin(&BlockId::new("testfile", 3))
        .err()
        .expect("pin should abort while every buffer is pinned");
    assert!(
        matches!(err, BufferManagerError::BufferAbort),
        "unexpected error: {err}"
    );

    bm.unpin(&b1);
    assert_eq!(bm.available(), 1);

    // The freed slot is the one the clock hand settles on.
    let b3 = bm.pin(&BlockId::new("testfile", 3))?;
    assert!(Arc::ptr_eq(&b3, &b1));
    assert_eq!(bm.available(), 0);

    bm.unpin(&b0);
    bm.unpin(&b2);
    bm.unpin(&b3);
    assert_eq!(bm.available(), 3);
    Ok(())
}

#[test]
fn pinning_a_resident_block_reuses_its_buffer() -> Result<()> {
    let (_fm, bm, _dir) = three_buffer_pool()?;
    let blk = BlockId::new("testfile", 0);

    let first = bm.pin(&blk)?;
    let second = bm.pin(&blk)?;
    assert!(Arc::ptr_eq(&first, &second));

    // Two pins, two unpins before the slot frees up.
    bm.unpin(&first);
    assert_eq!(bm.available(), 2);
    bm.unpin(&second);
    assert_eq!(bm.available(), 3);
    Ok(())
}

#[test]
fn clock_hand_advances_past_each_victim() -> Result<()> {
    let (_fm, bm, _dir) = three_buffer_pool()?;

    let b0 = bm.pin(&BlockId::new("testfile", 0))?;
    let b1 = bm.pin(&BlockId::new("testfile", 1))?;
    let b2 = bm.pin(&BlockId::new("testfile", 2))?;
    bm.unpin(&b0);
    bm.unpin(&b1);
    bm.unpin(&b2);

    // Victims came from slots 0, 1, 2, leaving the hand back at slot 0.
    let b3 = bm.pin(&BlockId::new("testfile", 3))?;
    assert!(Arc::ptr_eq(&b3, &b0));

    // Block 0 was just evicted; repinning it must take the next slot on,
    // not the one it used to live in.
    let b0_again = bm.pin(&BlockId::new("testfile", 0))?;
    assert!(Arc::ptr_eq(&b0_again, &b1));
    Ok(())
}

#[test]
fn modified_pages_survive_eviction() -> Result<()> {
    let (db, _dir) = create_test_db()?;

    let mut tx = db.new_tx()?;
    let blk = tx.append("t.tbl")?;
    tx.pin(&blk)?;
    tx.set_int(&blk, 80, 123, true)?;
    tx.unpin(&blk);

    // Push enough other blocks through the pool to force the write out.
    for _ in 0..12 {
        let other = tx.append("t.tbl")?;
        tx.pin(&other)?;
        tx.unpin(&other);
    }

    tx.pin(&blk)?;
    assert_eq!(tx.get_int(&blk, 80)?, 123);
    tx.commit()?;
    Ok(())
}
