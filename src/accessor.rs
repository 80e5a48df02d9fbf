//! Byte accessors: a logical read-only (or read-write) window over an
//! underlying byte store.
//!
//! Every format decoder is generic over [`ByteSource`] rather than over a
//! concrete buffer or file type, the same "accept a capability, not a
//! concrete type" idiom the rest of the crate uses for host filesystem
//! access. Slicing is logical - the slice borrows the parent's offset space,
//! it never copies.

use crate::{Error, Result};

/// Random-access read over a region of bytes.
pub trait ByteSource {
    /// Length of this accessor's window, in bytes.
    fn len(&self) -> u64;

    /// Whether this accessor's window is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns [`Error::OutOfRange`] if `offset + len` exceeds [`ByteSource::len`].
    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>>;

    /// Read a single byte at `offset`.
    fn read_u8(&self, offset: u64) -> Result<u8> {
        Ok(self.read(offset, 1)?[0])
    }

    /// Read a little-endian `u16` at `offset`.
    fn read_u16_le(&self, offset: u64) -> Result<u16> {
        let b = self.read(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian `u32` at `offset`.
    fn read_u32_le(&self, offset: u64) -> Result<u32> {
        let b = self.read(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian `u64` at `offset`.
    fn read_u64_le(&self, offset: u64) -> Result<u64> {
        let b = self.read(offset, 8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    /// Read `len` bytes at `offset` and interpret them as a string using
    /// `decode`.
    fn read_string(&self, offset: u64, len: u64, decode: fn(&[u8]) -> String) -> Result<String> {
        let bytes = self.read(offset, len)?;
        Ok(decode(&bytes))
    }

    /// Produce a sub-accessor over `[offset, offset+len)` of this window.
    ///
    /// The slice's own offset space starts back at zero; it never outlives
    /// the byte range it was carved from conceptually (backed by an owned
    /// copy, so there is no lifetime to track).
    fn slice(&self, offset: u64, len: u64) -> Result<SliceAccessor>
    where
        Self: Sized,
    {
        let bytes = self.read(offset, len)?;
        Ok(SliceAccessor::new(bytes))
    }
}

/// A [`ByteSource`] that additionally accepts writes.
pub trait MutableByteSource: ByteSource {
    /// Write `bytes` starting at `offset`, growing the window if necessary.
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()>;
}

/// A [`ByteSource`] backed by an in-memory buffer.
///
/// This is the accessor every decoder in this crate is ultimately handed:
/// partitions and regions are sliced out of a whole-image buffer (or a
/// directory-sourced synthetic one) rather than re-reading a file handle
/// per field.
#[derive(Debug, Clone)]
pub struct SliceAccessor {
    bytes: Vec<u8>,
}

impl SliceAccessor {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Borrow the full backing buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl ByteSource for SliceAccessor {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let start = usize::try_from(offset).map_err(|_| Error::OutOfRange)?;
        let length = usize::try_from(len).map_err(|_| Error::OutOfRange)?;
        let end = start.checked_add(length).ok_or(Error::OutOfRange)?;
        self.bytes
            .get(start..end)
            .map(|s| s.to_vec())
            .ok_or(Error::OutOfRange)
    }
}

impl MutableByteSource for SliceAccessor {
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| Error::OutOfRange)?;
        let end = start.checked_add(bytes.len()).ok_or(Error::OutOfRange)?;
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

/// A [`ByteSource`] backed by an open file handle rather than an in-memory
/// buffer, for ROM images too large to want fully resident.
///
/// Reads seek-then-read under an internal mutex: [`ByteSource`] requires
/// `&self`, but a single [`std::fs::File`] handle has one cursor shared by
/// every reader.
#[derive(Debug)]
pub struct FileAccessor {
    file: std::sync::Mutex<std::fs::File>,
    len: u64,
}

impl FileAccessor {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: std::sync::Mutex::new(file),
            len,
        })
    }
}

impl ByteSource for FileAccessor {
    fn len(&self) -> u64 {
        self.len
    }

    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};

        let end = offset.checked_add(len).ok_or(Error::OutOfRange)?;
        if end > self.len {
            return Err(Error::OutOfRange);
        }
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_within_window() {
        let acc = SliceAccessor::new(vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(acc.read_u32_le(0).unwrap(), 0x0403_0201);
    }

    #[test]
    fn read_outside_window_is_out_of_range() {
        let acc = SliceAccessor::new(vec![0u8; 4]);
        assert!(matches!(acc.read(2, 4), Err(Error::OutOfRange)));
    }

    #[test]
    fn slicing_offsets_relative_window() {
        let acc = SliceAccessor::new(vec![0, 1, 2, 3, 4, 5]);
        let sub = acc.slice(2, 3).unwrap();
        assert_eq!(sub.as_slice(), &[2, 3, 4]);
    }

    #[test]
    fn write_at_grows_buffer() {
        let mut acc = SliceAccessor::new(vec![0u8; 2]);
        acc.write_at(2, &[9, 9]).unwrap();
        assert_eq!(acc.as_slice(), &[0, 0, 9, 9]);
    }

    #[test]
    fn file_accessor_reads_match_slice_accessor() {
        let mut path = std::env::temp_dir();
        path.push(format!("cartkit-accessor-test-{:?}", std::thread::current().id()));
        std::fs::write(&path, [0x01, 0x02, 0x03, 0x04]).unwrap();

        let acc = FileAccessor::open(&path).unwrap();
        assert_eq!(acc.len(), 4);
        assert_eq!(acc.read_u32_le(0).unwrap(), 0x0403_0201);
        assert!(matches!(acc.read(2, 4), Err(Error::OutOfRange)));

        std::fs::remove_file(&path).ok();
    }
}
