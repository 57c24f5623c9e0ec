use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::BlockId;
use crate::storage::file::page::Page;

#[derive(Error, Debug)]
pub enum FileManagerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FileManagerError>;

struct FileTable {
    open_files: HashMap<String, File>,
    io_count: usize,
}

/// The single point of OS-level I/O: owns the database directory and reads,
/// writes, appends, and truncates fixed-size blocks.
///
/// One file handle is kept per file name, opened lazily. All I/O goes
/// through one mutex so that seek-then-transfer pairs on a shared handle
/// never interleave. Every write is followed by `sync_data`, giving the
/// handles synchronous-write semantics.
pub struct FileManager {
    db_dir: PathBuf,
    block_size: usize,
    is_new: bool,
    state: Mutex<FileTable>,
}

impl FileManager {
    /// Open (or create) the database directory. Leftover temporary tables,
    /// recognizable by a name starting with `temp`, are deleted.
    pub fn new(db_dir: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref().to_path_buf();
        let is_new = !db_dir.exists();
        if is_new {
            fs::create_dir_all(&db_dir)?;
        }

        for entry in fs::read_dir(&db_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with("temp") {
                debug!("removing leftover temp file {:?}", entry.file_name());
                fs::remove_file(entry.path())?;
            }
        }

        Ok(Self {
            db_dir,
            block_size,
            is_new,
            state: Mutex::new(FileTable {
                open_files: HashMap::new(),
                io_count: 0,
            }),
        })
    }

    /// Read the block into the page, filling its entire buffer. A block at
    /// or past the current end of file reads as all zeros, which is what a
    /// never-written block contains.
    pub fn read(&self, blk: &BlockId, page: &mut Page) -> Result<()> {
        let mut state = self.state.lock();
        let offset = blk.number() as u64 * self.block_size as u64;
        let file = Self::file_for(&mut state.open_files, &self.db_dir, blk.file_name())?;

        if offset >= file.metadata()?.len() {
            page.contents_mut().fill(0);
        } else {
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(page.contents_mut())?;
        }
        state.io_count += 1;
        Ok(())
    }

    /// Write the page's entire buffer to the block's position on disk.
    pub fn write(&self, blk: &BlockId, page: &Page) -> Result<()> {
        let mut state = self.state.lock();
        let offset = blk.number() as u64 * self.block_size as u64;
        let file = Self::file_for(&mut state.open_files, &self.db_dir, blk.file_name())?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.contents())?;
        file.sync_data()?;
        state.io_count += 1;
        Ok(())
    }

    /// Extend the file by one zero-filled block and return its address.
    pub fn append(&self, filename: &str) -> Result<BlockId> {
        let mut state = self.state.lock();
        let file = Self::file_for(&mut state.open_files, &self.db_dir, filename)?;
        let new_blknum = (file.metadata()?.len() / self.block_size as u64) as i32;

        let zeros = vec![0u8; self.block_size];
        file.seek(SeekFrom::Start(new_blknum as u64 * self.block_size as u64))?;
        file.write_all(&zeros)?;
        file.sync_data()?;
        state.io_count += 1;
        Ok(BlockId::new(filename, new_blknum))
    }

    /// The file's current length in blocks.
    pub fn length(&self, filename: &str) -> Result<i32> {
        let mut state = self.state.lock();
        let file = Self::file_for(&mut state.open_files, &self.db_dir, filename)?;
        Ok((file.metadata()?.len() / self.block_size as u64) as i32)
    }

    /// Shrink the file back to `blocks` blocks. Used when a transaction
    /// that appended blocks rolls back.
    pub fn truncate(&self, filename: &str, blocks: i32) -> Result<()> {
        let mut state = self.state.lock();
        let file = Self::file_for(&mut state.open_files, &self.db_dir, filename)?;
        file.set_len(blocks as u64 * self.block_size as u64)?;
        file.sync_data()?;
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// True if the database directory was created by this manager.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Number of block reads and writes performed so far.
    pub fn io_count(&self) -> usize {
        self.state.lock().io_count
    }

    pub fn reset_io_count(&self) {
        self.state.lock().io_count = 0;
    }

    fn file_for<'a>(
        open_files: &'a mut HashMap<String, File>,
        db_dir: &Path,
        filename: &str,
    ) -> io::Result<&'a mut File> {
        match open_files.entry(filename.to_string()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(v) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(db_dir.join(filename))?;
                Ok(v.insert(file))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_file_manager(block_size: usize) -> (FileManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let fm = FileManager::new(dir.path().join("db"), block_size).unwrap();
        (fm, dir)
    }

    #[test]
    fn append_grows_length() {
        let (fm, _dir) = test_file_manager(128);
        assert_eq!(fm.length("t.tbl").unwrap(), 0);

        let blk0 = fm.append("t.tbl").unwrap();
        let blk1 = fm.append("t.tbl").unwrap();
        assert_eq!(blk0.number(), 0);
        assert_eq!(blk1.number(), 1);
        assert_eq!(fm.length("t.tbl").unwrap(), 2);
    }

    #[test]
    fn write_then_read_round_trip() {
        let (fm, _dir) = test_file_manager(128);
        let blk = fm.append("t.tbl").unwrap();

        let mut page = Page::new(fm.block_size());
        page.set_int(40, 77);
        page.set_string(48, "hello");
        fm.write(&blk, &page).unwrap();

        let mut readback = Page::new(fm.block_size());
        fm.read(&blk, &mut readback).unwrap();
        assert_eq!(readback.get_int(40), 77);
        assert_eq!(readback.get_string(48), "hello");
    }

    #[test]
    fn read_past_end_is_zero_filled() {
        let (fm, _dir) = test_file_manager(128);
        let mut page = Page::new(fm.block_size());
        page.set_int(0, 99);

        fm.read(&BlockId::new("missing.tbl", 3), &mut page).unwrap();
        assert!(page.contents().iter().all(|&b| b == 0));
    }

    #[test]
    fn truncate_shrinks_file() {
        let (fm, _dir) = test_file_manager(128);
        for _ in 0..4 {
            fm.append("t.tbl").unwrap();
        }
        fm.truncate("t.tbl", 1).unwrap();
        assert_eq!(fm.length("t.tbl").unwrap(), 1);
    }

    #[test]
    fn temp_files_removed_on_startup() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("db");
        {
            let fm = FileManager::new(&db_path, 128).unwrap();
            fm.append("temp_scratch").unwrap();
            fm.append("keep.tbl").unwrap();
            assert!(fm.is_new());
        }

        let fm = FileManager::new(&db_path, 128).unwrap();
        assert!(!fm.is_new());
        assert!(!db_path.join("temp_scratch").exists());
        assert_eq!(fm.length("keep.tbl").unwrap(), 1);
    }

    #[test]
    fn io_statistics_count_transfers() {
        let (fm, _dir) = test_file_manager(128);
        let blk = fm.append("t.tbl").unwrap();
        let mut page = Page::new(fm.block_size());
        fm.read(&blk, &mut page).unwrap();
        fm.write(&blk, &page).unwrap();
        assert_eq!(fm.io_count(), 3);

        fm.reset_io_count();
        assert_eq!(fm.io_count(), 0);
    }
}
