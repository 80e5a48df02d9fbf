//! RomFS (IVFC Level 3) parsing.
//!
//! An IVFC header locates a Level 3 payload holding five regions in order:
//! DirectoryHashTable, DirectoryMetadataTable, FileHashTable,
//! FileMetadataTable, FileData. This decoder ignores the hash tree (levels
//! 1/2 and the per-level integrity hashes) - verifying them is a
//! cryptographic concern out of scope here - and walks the metadata tables
//! directly into an in-memory directory tree.
//!
//! Directory entry (0x18-byte header + padded name):
//! `parentDirOffset u32, siblingDirOffset u32, firstChildDirOffset u32,
//! firstFileOffset u32, nextHashBucketOffset u32, nameLength u32, name
//! (UTF-16LE, padded to 4 bytes)`.
//!
//! File entry (0x20-byte header + padded name):
//! `parentDirOffset u32, siblingFileOffset u32, dataOffset u64, dataSize
//! u64, nextHashBucketOffset u32, nameLength u32, name (UTF-16LE, padded to
//! 4 bytes)`.

use crate::accessor::ByteSource;
use crate::utils::{check_magic, le_u32, le_u64, utf16le_string};
use crate::{Error, Result};

pub const SENTINEL: u32 = 0xFFFF_FFFF;
const IVFC_MAGIC: &[u8; 4] = b"IVFC";
const IVFC_LEVEL3_OFFSET_FIELD: usize = 0x3C;
const IVFC_LEVEL3_SIZE_FIELD: usize = 0x44;
const IVFC_HEADER_SIZE: u64 = 0x60;

const DIR_ENTRY_HEADER_SIZE: usize = 0x18;
const FILE_ENTRY_HEADER_SIZE: usize = 0x20;

/// One directory in the reconstructed tree.
#[derive(Debug, Clone)]
pub struct RomFsDir {
    pub name: String,
    pub dirs: Vec<RomFsDir>,
    pub files: Vec<RomFsFile>,
}

/// One file in the reconstructed tree, with its data location in the
/// FileData region (offset/size are relative to that region, not to the
/// whole RomFS accessor).
#[derive(Debug, Clone)]
pub struct RomFsFile {
    pub name: String,
    pub data_offset: u64,
    pub data_size: u64,
}

#[derive(Debug, Clone)]
pub struct RomFs {
    pub root: RomFsDir,
    file_data_offset: u64,
}

impl RomFs {
    pub fn probe(accessor: &impl ByteSource) -> bool {
        let Ok(buf) = accessor.read(0, 4) else {
            return false;
        };
        buf.as_slice() == IVFC_MAGIC
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse(accessor: &impl ByteSource) -> Result<Self> {
        let ivfc = accessor.read(0, IVFC_HEADER_SIZE)?;
        check_magic(&ivfc, 0, IVFC_MAGIC)?;

        let level3_offset = le_u64(&ivfc, IVFC_LEVEL3_OFFSET_FIELD);
        let level3_size = le_u64(&ivfc, IVFC_LEVEL3_SIZE_FIELD);
        let level3 = accessor.slice(level3_offset, level3_size)?;

        let l3_header = level3.read(0, 0x28)?;
        let dir_hash_offset = le_u32(&l3_header, 0x04) as u64;
        let dir_meta_offset = le_u32(&l3_header, 0x0C) as u64;
        let dir_meta_size = le_u32(&l3_header, 0x10) as u64;
        let file_hash_offset = le_u32(&l3_header, 0x14) as u64;
        let file_meta_offset = le_u32(&l3_header, 0x1C) as u64;
        let file_meta_size = le_u32(&l3_header, 0x20) as u64;
        let file_data_offset = le_u32(&l3_header, 0x24) as u64;
        let _ = (dir_hash_offset, file_hash_offset);

        let dir_table = level3.read(dir_meta_offset, dir_meta_size)?;
        let file_table = level3.read(file_meta_offset, file_meta_size)?;

        let root = build_dir(&dir_table, &file_table, 0)?;

        Ok(RomFs {
            root,
            file_data_offset: level3_offset + file_data_offset,
        })
    }

    /// Slice a file's bytes out of the whole RomFS accessor (the data
    /// region sits after the Level 3 metadata tables).
    pub fn slice_file(
        &self,
        accessor: &impl ByteSource,
        file: &RomFsFile,
    ) -> Result<crate::accessor::SliceAccessor> {
        accessor.slice(self.file_data_offset + file.data_offset, file.data_size)
    }
}

struct DirEntry {
    first_child: u32,
    first_file: u32,
    sibling: u32,
    name: String,
}

struct FileEntry {
    sibling: u32,
    data_offset: u64,
    data_size: u64,
    name: String,
}

fn read_dir_entry(buf: &[u8], offset: u32) -> Result<DirEntry> {
    if offset == SENTINEL {
        return Err(Error::NotFound);
    }
    let o = offset as usize;
    let header = buf.get(o..o + DIR_ENTRY_HEADER_SIZE).ok_or(Error::OutOfRange)?;
    let first_child = le_u32(header, 8);
    let first_file = le_u32(header, 12);
    let sibling = le_u32(header, 4);
    let name_len = le_u32(header, 20) as u64;
    let name = utf16le_string(buf, (o + DIR_ENTRY_HEADER_SIZE) as u64, name_len as usize)?;
    Ok(DirEntry {
        first_child,
        first_file,
        sibling,
        name,
    })
}

fn read_file_entry(buf: &[u8], offset: u32) -> Result<FileEntry> {
    if offset == SENTINEL {
        return Err(Error::NotFound);
    }
    let o = offset as usize;
    let header = buf.get(o..o + FILE_ENTRY_HEADER_SIZE).ok_or(Error::OutOfRange)?;
    let sibling = le_u32(header, 4);
    let data_offset = le_u64(header, 8);
    let data_size = le_u64(header, 16);
    let name_len = le_u32(header, 28) as u64;
    let name = utf16le_string(buf, (o + FILE_ENTRY_HEADER_SIZE) as u64, name_len as usize)?;
    Ok(FileEntry {
        sibling,
        data_offset,
        data_size,
        name,
    })
}

fn build_dir(dir_table: &[u8], file_table: &[u8], offset: u32) -> Result<RomFsDir> {
    let entry = read_dir_entry(dir_table, offset)?;

    let mut dirs = Vec::new();
    let mut child = entry.first_child;
    while child != SENTINEL {
        let child_entry_peek = read_dir_entry(dir_table, child)?;
        dirs.push(build_dir(dir_table, file_table, child)?);
        child = child_entry_peek.sibling;
    }

    let mut files = Vec::new();
    let mut file_offset = entry.first_file;
    while file_offset != SENTINEL {
        let f = read_file_entry(file_table, file_offset)?;
        let sibling = f.sibling;
        files.push(RomFsFile {
            name: f.name,
            data_offset: f.data_offset,
            data_size: f.data_size,
        });
        file_offset = sibling;
    }

    Ok(RomFsDir {
        name: entry.name,
        dirs,
        files,
    })
}
