use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};

/// An in-memory image of one disk block, with absolute typed accessors.
///
/// All multi-byte integers are big-endian. Byte slices and strings are
/// length-prefixed with a 32-bit length. Writes are bounds-checked and
/// panic on overflow (a caller bug, not a runtime condition); reads trust
/// the offset they are given.
pub struct Page {
    buf: Vec<u8>,
}

impl Page {
    /// Allocate a zero-filled page of the given block size. This is the
    /// constructor the buffer pool uses.
    pub fn new(block_size: usize) -> Self {
        Self {
            buf: vec![0; block_size],
        }
    }

    /// Wrap an existing byte vector. This is the constructor log records
    /// use to encode and decode themselves.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { buf: bytes }
    }

    pub fn get_int(&self, offset: usize) -> i32 {
        BigEndian::read_i32(&self.buf[offset..offset + 4])
    }

    pub fn set_int(&mut self, offset: usize, val: i32) {
        assert!(
            offset + 4 <= self.buf.len(),
            "page overflow writing int at offset {offset}"
        );
        BigEndian::write_i32(&mut self.buf[offset..offset + 4], val);
    }

    /// Read the length-prefixed byte slice starting at `offset`.
    pub fn get_bytes(&self, offset: usize) -> &[u8] {
        let len = self.get_int(offset) as usize;
        &self.buf[offset + 4..offset + 4 + len]
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + 4 + bytes.len() <= self.buf.len(),
            "page overflow writing {} bytes at offset {offset}",
            bytes.len()
        );
        self.set_int(offset, bytes.len() as i32);
        self.buf[offset + 4..offset + 4 + bytes.len()].copy_from_slice(bytes);
    }

    pub fn get_string(&self, offset: usize) -> String {
        String::from_utf8_lossy(self.get_bytes(offset)).into_owned()
    }

    pub fn set_string(&mut self, offset: usize, val: &str) {
        self.set_bytes(offset, val.as_bytes());
    }

    pub fn get_bool(&self, offset: usize) -> bool {
        self.buf[offset] == 1
    }

    pub fn set_bool(&mut self, offset: usize, val: bool) {
        assert!(
            offset < self.buf.len(),
            "page overflow writing bool at offset {offset}"
        );
        self.buf[offset] = val as u8;
    }

    /// Read the 64-bit millisecond timestamp at `offset`. Bit patterns
    /// outside chrono's representable range read as the epoch.
    pub fn get_date(&self, offset: usize) -> DateTime<Utc> {
        let millis = BigEndian::read_i64(&self.buf[offset..offset + 8]);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    pub fn set_date(&mut self, offset: usize, val: DateTime<Utc>) {
        assert!(
            offset + 8 <= self.buf.len(),
            "page overflow writing date at offset {offset}"
        );
        BigEndian::write_i64(&mut self.buf[offset..offset + 8], val.timestamp_millis());
    }

    /// The maximum number of page bytes a string of `strlen` characters can
    /// occupy: the 4-byte length prefix plus one byte per character under
    /// the ASCII charset.
    pub fn max_length(strlen: usize) -> usize {
        4 + strlen
    }

    pub(crate) fn contents(&self) -> &[u8] {
        &self.buf
    }

    /// Give the underlying bytes back, for callers that built a record
    /// image through a wrapped page.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}
