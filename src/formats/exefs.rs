//! ExeFS (executable filesystem) parsing.
//!
//! A 0x200-byte header holds 10 file descriptors (`name[8]`, `offset u32`,
//! `size u32`), followed by 0x20 reserved bytes, then 10 SHA-256 hashes (one
//! per descriptor slot). File data starts at 0x200; a descriptor's `offset`
//! is relative to that. An empty (zero-length name) slot is ignored.

use crate::accessor::ByteSource;
use crate::utils::{ascii_string, le_u32};
use crate::Result;

pub const HEADER_SIZE: u64 = 0x200;
pub const MAX_FILES: usize = 10;
const DESCRIPTOR_SIZE: usize = 0x10;
const NAME_SIZE: usize = 8;
const HASHES_OFFSET: usize = 0xC0;
const HASH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct ExeFsFile {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub hash: [u8; HASH_SIZE],
}

#[derive(Debug, Clone)]
pub struct ExeFs {
    pub files: Vec<ExeFsFile>,
}

impl ExeFs {
    /// A bare ExeFS carries no magic number, so probing leans on its
    /// structural invariants instead: the 0x20-byte reserved gap before the
    /// hash table is always zeroed, every descriptor name is printable
    /// ASCII, and at least one descriptor's `offset+size` must fit the data
    /// that follows the header. Without this a DS header (also magicless,
    /// checked later in the probe chain) would be swallowed as an
    /// all-zero-length ExeFS before `Nds::probe` ever runs.
    pub fn probe(accessor: &impl ByteSource) -> bool {
        if accessor.len() < HEADER_SIZE {
            return false;
        }
        let Ok(header) = accessor.read(0, HEADER_SIZE) else {
            return false;
        };
        if header[0xA0..HASHES_OFFSET].iter().any(|&b| b != 0) {
            return false;
        }
        let data_len = accessor.len() - HEADER_SIZE;
        let mut any_file = false;
        for i in 0..MAX_FILES {
            let d = i * DESCRIPTOR_SIZE;
            let name = &header[d..d + NAME_SIZE];
            if name.iter().all(|&b| b == 0) {
                continue;
            }
            if !name
                .iter()
                .take_while(|&&b| b != 0)
                .all(|&b| b.is_ascii_graphic())
            {
                return false;
            }
            let offset = le_u32(&header, d + NAME_SIZE) as u64;
            let size = le_u32(&header, d + NAME_SIZE + 4) as u64;
            match offset.checked_add(size) {
                Some(end) if end <= data_len => any_file = true,
                _ => return false,
            }
        }
        any_file
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse(accessor: &impl ByteSource) -> Result<Self> {
        let header = accessor.read(0, HEADER_SIZE)?;

        let mut files = Vec::new();
        for i in 0..MAX_FILES {
            let d = i * DESCRIPTOR_SIZE;
            let name = ascii_string(&header, d, NAME_SIZE)?;
            if name.is_empty() {
                continue;
            }
            let offset = le_u32(&header, d + NAME_SIZE);
            let size = le_u32(&header, d + NAME_SIZE + 4);

            let h = HASHES_OFFSET + (MAX_FILES - 1 - i) * HASH_SIZE;
            let mut hash = [0u8; HASH_SIZE];
            hash.copy_from_slice(&header[h..h + HASH_SIZE]);

            files.push(ExeFsFile {
                name,
                offset,
                size,
                hash,
            });
        }

        tracing::debug!(files = files.len(), "parsed exefs");
        Ok(ExeFs { files })
    }

    /// Look up a file by name, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&ExeFsFile> {
        self.files.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Slice a file's bytes out of the partition accessor (offsets are
    /// relative to the end of the 0x200 header).
    pub fn slice_file(
        &self,
        accessor: &impl ByteSource,
        file: &ExeFsFile,
    ) -> Result<crate::accessor::SliceAccessor> {
        accessor.slice(HEADER_SIZE + file.offset as u64, file.size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::SliceAccessor;

    fn synthetic_exefs(files: &[(&str, u32, u32)]) -> Vec<u8> {
        let mut buf = vec![0u8; 0x200 + 0x1000];
        for (i, (name, offset, size)) in files.iter().enumerate() {
            let d = i * DESCRIPTOR_SIZE;
            let name_bytes = name.as_bytes();
            buf[d..d + name_bytes.len()].copy_from_slice(name_bytes);
            buf[d + NAME_SIZE..d + NAME_SIZE + 4].copy_from_slice(&offset.to_le_bytes());
            buf[d + NAME_SIZE + 4..d + NAME_SIZE + 8].copy_from_slice(&size.to_le_bytes());
        }
        buf
    }

    #[test]
    fn parses_named_descriptors_and_skips_empty_slots() {
        let buf = synthetic_exefs(&[("icon", 0, 0x100), ("banner", 0x100, 0x200)]);
        let acc = SliceAccessor::new(buf);
        let exefs = ExeFs::parse(&acc).unwrap();
        assert_eq!(exefs.files.len(), 2);
        assert_eq!(exefs.get("icon").unwrap().size, 0x100);
        assert_eq!(exefs.get("ICON").unwrap().size, 0x100);
    }

    #[test]
    fn slices_file_past_header() {
        let buf = synthetic_exefs(&[("code.bin", 0, 0x10)]);
        let acc = SliceAccessor::new(buf);
        let exefs = ExeFs::parse(&acc).unwrap();
        let f = exefs.get("code.bin").unwrap();
        let data = exefs.slice_file(&acc, f).unwrap();
        assert_eq!(data.len(), 0x10);
    }
}
