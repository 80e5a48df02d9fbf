//! RomFS rebuild: the inverse of [`crate::formats::romfs`].
//!
//! Walks a tree, assigns every directory/file a table offset by laying the
//! metadata tables out sequentially, builds the name hash chains, and wraps
//! the Level 3 payload in a freshly computed IVFC hash tree.

use sha2::{Digest, Sha256};

use crate::formats::romfs::SENTINEL;
use crate::utils::{align_up, encode_utf16le};
use crate::{Error, Result};

const DIR_ENTRY_HEADER_SIZE: u32 = 0x18;
const FILE_ENTRY_HEADER_SIZE: u32 = 0x20;
const FILE_ALIGNMENT: u64 = 16;
const IVFC_HEADER_SIZE: u64 = 0x60;
const IVFC_BLOCK_SIZE: u64 = 0x1000;
const IVFC_BLOCK_LOG2: u32 = 12;

/// A directory in the tree to be rebuilt. Built by the VFS from the merged
/// backing + overlay view before calling [`rebuild`].
#[derive(Debug, Clone, Default)]
pub struct BuildDir {
    pub name: String,
    pub dirs: Vec<BuildDir>,
    pub files: Vec<BuildFile>,
}

#[derive(Debug, Clone)]
pub struct BuildFile {
    pub name: String,
    pub data: Vec<u8>,
}

struct DirLayout {
    offset: u32,
    parent_offset: u32,
    first_child: u32,
    first_file: u32,
    sibling: u32,
    name: String,
}

struct FileLayout {
    offset: u32,
    parent_offset: u32,
    sibling: u32,
    data_offset: u64,
    data_size: u64,
    name: String,
}

/// Rebuild a whole RomFS image (IVFC header + Level 3) from `root`.
pub fn rebuild(root: &BuildDir) -> Result<Vec<u8>> {
    let mut dirs: Vec<DirLayout> = Vec::new();
    let mut files: Vec<FileLayout> = Vec::new();
    let mut cursor_dir = 0u32;
    let mut cursor_file = 0u32;

    layout_dir(root, 0, &mut cursor_dir, &mut cursor_file, &mut dirs, &mut files)?;

    // layout_dir only assigns table offsets; a second pass packs the actual
    // file bytes in the same depth-first, files-then-subdirs order and fills
    // in each file's data_offset/data_size.
    let mut data_offset = 0u64;
    let mut payload = Vec::new();
    let flat_files = collect_files_in_order(root);
    for (layout, build_file) in files.iter_mut().zip(flat_files.iter()) {
        layout.data_offset = data_offset;
        layout.data_size = build_file.data.len() as u64;
        payload.extend_from_slice(&build_file.data);
        let aligned = align_up(build_file.data.len() as u64, FILE_ALIGNMENT);
        payload.resize(payload.len() + (aligned - build_file.data.len() as u64) as usize, 0);
        data_offset += aligned;
        if data_offset > (1u64 << 56) {
            return Err(Error::SizeLimit);
        }
    }

    let dir_bucket_count = bucket_count_for(dirs.len());
    let file_bucket_count = bucket_count_for(files.len());

    let mut dir_next = std::collections::HashMap::new();
    let dir_hash_table = build_hash_table(
        dirs.iter().map(|d| (d.offset, d.parent_offset, d.name.as_str())),
        dir_bucket_count,
        &mut dir_next,
    );

    let mut file_next = std::collections::HashMap::new();
    let file_hash_table = build_hash_table(
        files.iter().map(|f| (f.offset, f.parent_offset, f.name.as_str())),
        file_bucket_count,
        &mut file_next,
    );

    let dir_meta = serialize_dir_table(&dirs, &dir_next);
    let file_meta = serialize_file_table(&files, &file_next);

    let dir_hash_bytes = serialize_hash_table(&dir_hash_table);
    let file_hash_bytes = serialize_hash_table(&file_hash_table);

    let level3 = assemble_level3(&dir_hash_bytes, &dir_meta, &file_hash_bytes, &file_meta, &payload);
    let image = wrap_ivfc(level3);
    tracing::info!(dirs = dirs.len(), files = files.len(), bytes = image.len(), "rebuilt romfs");
    Ok(image)
}

fn collect_files_in_order(dir: &BuildDir) -> Vec<&BuildFile> {
    let mut sorted_files: Vec<&BuildFile> = dir.files.iter().collect();
    sorted_files.sort_by(|a, b| utf16_cmp(&a.name, &b.name));
    let mut sorted_dirs: Vec<&BuildDir> = dir.dirs.iter().collect();
    sorted_dirs.sort_by(|a, b| utf16_cmp(&a.name, &b.name));

    let mut out = sorted_files;
    for child in &sorted_dirs {
        out.extend(collect_files_in_order(child));
    }
    out
}

fn utf16_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

/// Lays out `dir` and its whole subtree into `dirs`/`files`, returning this
/// directory's own table offset. `parent_offset` is the byte offset of the
/// already-laid-out parent (0 for the root, matching its own offset).
fn layout_dir(
    dir: &BuildDir,
    parent_offset: u32,
    cursor_dir: &mut u32,
    cursor_file: &mut u32,
    dirs: &mut Vec<DirLayout>,
    files: &mut Vec<FileLayout>,
) -> Result<u32> {
    let my_offset = *cursor_dir;
    let name_len = align_up(encode_utf16le(&dir.name).len() as u64, 4) as u32;
    *cursor_dir += DIR_ENTRY_HEADER_SIZE + name_len;

    let index = dirs.len();
    dirs.push(DirLayout {
        offset: my_offset,
        parent_offset: if my_offset == 0 { 0 } else { parent_offset },
        first_child: SENTINEL,
        first_file: SENTINEL,
        sibling: SENTINEL,
        name: dir.name.clone(),
    });

    let mut sorted_files: Vec<&BuildFile> = dir.files.iter().collect();
    sorted_files.sort_by(|a, b| utf16_cmp(&a.name, &b.name));
    check_no_duplicates(sorted_files.iter().map(|f| f.name.as_str()))?;

    let mut sorted_dirs: Vec<&BuildDir> = dir.dirs.iter().collect();
    sorted_dirs.sort_by(|a, b| utf16_cmp(&a.name, &b.name));
    check_no_duplicates(sorted_dirs.iter().map(|d| d.name.as_str()))?;

    let mut prev_file_offset: Option<u32> = None;
    let mut first_file = SENTINEL;
    for f in &sorted_files {
        let file_offset = *cursor_file;
        let fname_len = align_up(encode_utf16le(&f.name).len() as u64, 4) as u32;
        *cursor_file += FILE_ENTRY_HEADER_SIZE + fname_len;

        if first_file == SENTINEL {
            first_file = file_offset;
        }
        if let Some(prev) = prev_file_offset {
            files[find_file_index(files, prev)].sibling = file_offset;
        }
        files.push(FileLayout {
            offset: file_offset,
            parent_offset: my_offset,
            sibling: SENTINEL,
            data_offset: 0,
            data_size: 0,
            name: f.name.clone(),
        });
        prev_file_offset = Some(file_offset);
    }

    let mut prev_dir_offset: Option<u32> = None;
    let mut first_child = SENTINEL;
    for child in &sorted_dirs {
        let child_offset = layout_dir(child, my_offset, cursor_dir, cursor_file, dirs, files)?;
        if first_child == SENTINEL {
            first_child = child_offset;
        }
        if let Some(prev) = prev_dir_offset {
            dirs[find_dir_index(dirs, prev)].sibling = child_offset;
        }
        prev_dir_offset = Some(child_offset);
    }

    dirs[index].first_file = first_file;
    dirs[index].first_child = first_child;

    Ok(my_offset)
}

fn check_no_duplicates<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::InvalidTree);
        }
    }
    Ok(())
}

fn find_dir_index(dirs: &[DirLayout], offset: u32) -> usize {
    dirs.iter().position(|d| d.offset == offset).expect("offset was just assigned")
}

fn find_file_index(files: &[FileLayout], offset: u32) -> usize {
    files.iter().position(|f| f.offset == offset).expect("offset was just assigned")
}

fn bucket_count_for(count: usize) -> u32 {
    largest_prime_leq((count as u32 / 2).max(3))
}

fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut i = 3;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

fn largest_prime_leq(n: u32) -> u32 {
    let mut n = n.max(2);
    while !is_prime(n) {
        n -= 1;
    }
    n
}

/// `hash = parent_offset; for each UTF-16 code unit c: hash = (hash>>5) ^ (hash<<27) ^ c`.
fn name_hash(parent_offset: u32, name: &str) -> u32 {
    let mut hash: u32 = parent_offset;
    for c in name.encode_utf16() {
        hash = (hash >> 5) ^ (hash << 27) ^ (c as u32);
    }
    hash
}

/// Builds the hash-bucket table (head pointer per bucket) and, via
/// `next_out`, the chain link for every entry (by its own table offset).
fn build_hash_table<'a>(
    entries: impl Iterator<Item = (u32, u32, &'a str)>,
    bucket_count: u32,
    next_out: &mut std::collections::HashMap<u32, u32>,
) -> Vec<u32> {
    let mut table = vec![SENTINEL; bucket_count as usize];
    for (offset, parent_offset, name) in entries {
        let bucket = (name_hash(parent_offset, name) % bucket_count) as usize;
        next_out.insert(offset, table[bucket]);
        table[bucket] = offset;
    }
    table
}

fn serialize_hash_table(table: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(table.len() * 4);
    for &entry in table {
        out.extend_from_slice(&entry.to_le_bytes());
    }
    out
}

fn serialize_dir_table(dirs: &[DirLayout], next: &std::collections::HashMap<u32, u32>) -> Vec<u8> {
    let total = dirs
        .iter()
        .map(|d| DIR_ENTRY_HEADER_SIZE + align_up(encode_utf16le(&d.name).len() as u64, 4) as u32)
        .sum::<u32>();
    let mut out = vec![0u8; total as usize];
    for d in dirs {
        let o = d.offset as usize;
        let name_bytes = encode_utf16le(&d.name);
        out[o..o + 4].copy_from_slice(&d.parent_offset.to_le_bytes());
        out[o + 4..o + 8].copy_from_slice(&d.sibling.to_le_bytes());
        out[o + 8..o + 12].copy_from_slice(&d.first_child.to_le_bytes());
        out[o + 12..o + 16].copy_from_slice(&d.first_file.to_le_bytes());
        out[o + 16..o + 20].copy_from_slice(&next.get(&d.offset).copied().unwrap_or(SENTINEL).to_le_bytes());
        out[o + 20..o + 24].copy_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        let name_start = o + DIR_ENTRY_HEADER_SIZE as usize;
        out[name_start..name_start + name_bytes.len()].copy_from_slice(&name_bytes);
    }
    out
}

fn serialize_file_table(files: &[FileLayout], next: &std::collections::HashMap<u32, u32>) -> Vec<u8> {
    let total = files
        .iter()
        .map(|f| FILE_ENTRY_HEADER_SIZE + align_up(encode_utf16le(&f.name).len() as u64, 4) as u32)
        .sum::<u32>();
    let mut out = vec![0u8; total as usize];
    for f in files {
        let o = f.offset as usize;
        let name_bytes = encode_utf16le(&f.name);
        out[o..o + 4].copy_from_slice(&f.parent_offset.to_le_bytes());
        out[o + 4..o + 8].copy_from_slice(&f.sibling.to_le_bytes());
        out[o + 8..o + 16].copy_from_slice(&f.data_offset.to_le_bytes());
        out[o + 16..o + 24].copy_from_slice(&f.data_size.to_le_bytes());
        out[o + 24..o + 28].copy_from_slice(&next.get(&f.offset).copied().unwrap_or(SENTINEL).to_le_bytes());
        out[o + 28..o + 32].copy_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        let name_start = o + FILE_ENTRY_HEADER_SIZE as usize;
        out[name_start..name_start + name_bytes.len()].copy_from_slice(&name_bytes);
    }
    out
}

fn assemble_level3(
    dir_hash: &[u8],
    dir_meta: &[u8],
    file_hash: &[u8],
    file_meta: &[u8],
    file_data: &[u8],
) -> Vec<u8> {
    const L3_HEADER_SIZE: u64 = 0x28;
    let dir_hash_offset = L3_HEADER_SIZE;
    let dir_meta_offset = align_up(dir_hash_offset + dir_hash.len() as u64, 4);
    let file_hash_offset = align_up(dir_meta_offset + dir_meta.len() as u64, 4);
    let file_meta_offset = align_up(file_hash_offset + file_hash.len() as u64, 4);
    let file_data_offset = align_up(file_meta_offset + file_meta.len() as u64, 4);

    let mut out = vec![0u8; L3_HEADER_SIZE as usize];
    out[0x00..0x04].copy_from_slice(&(L3_HEADER_SIZE as u32).to_le_bytes());
    out[0x04..0x08].copy_from_slice(&(dir_hash.len() as u32).to_le_bytes());
    out[0x0C..0x10].copy_from_slice(&(dir_meta_offset as u32).to_le_bytes());
    out[0x10..0x14].copy_from_slice(&(dir_meta.len() as u32).to_le_bytes());
    out[0x14..0x18].copy_from_slice(&(file_hash_offset as u32).to_le_bytes());
    out[0x18..0x1C].copy_from_slice(&(file_hash.len() as u32).to_le_bytes());
    out[0x1C..0x20].copy_from_slice(&(file_meta_offset as u32).to_le_bytes());
    out[0x20..0x24].copy_from_slice(&(file_meta.len() as u32).to_le_bytes());
    out[0x24..0x28].copy_from_slice(&(file_data_offset as u32).to_le_bytes());

    out.resize(dir_hash_offset as usize, 0);
    out.extend_from_slice(dir_hash);
    out.resize(dir_meta_offset as usize, 0);
    out.extend_from_slice(dir_meta);
    out.resize(file_hash_offset as usize, 0);
    out.extend_from_slice(file_hash);
    out.resize(file_meta_offset as usize, 0);
    out.extend_from_slice(file_meta);
    out.resize(file_data_offset as usize, 0);
    out.extend_from_slice(file_data);
    out
}

/// Hashes `data` in fixed-size blocks, zero-padding the final partial block
/// for hashing purposes only.
fn hash_blocks(data: &[u8], block_size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    let block = block_size as usize;
    if data.is_empty() {
        let hash = Sha256::digest([]);
        out.extend_from_slice(hash.as_slice());
        return out;
    }
    while offset < data.len() {
        let end = (offset + block).min(data.len());
        let mut buf = vec![0u8; block];
        buf[..end - offset].copy_from_slice(&data[offset..end]);
        let hash = Sha256::digest(&buf);
        out.extend_from_slice(hash.as_slice());
        offset += block;
    }
    out
}

fn wrap_ivfc(level3: Vec<u8>) -> Vec<u8> {
    let level2 = hash_blocks(&level3, IVFC_BLOCK_SIZE);
    let level1 = hash_blocks(&level2, IVFC_BLOCK_SIZE);
    let master_hash = Sha256::digest(&level1);

    let level1_offset = IVFC_HEADER_SIZE + master_hash.len() as u64;
    let level2_offset = align_up(level1_offset + level1.len() as u64, IVFC_BLOCK_SIZE);
    let level3_offset = align_up(level2_offset + level2.len() as u64, IVFC_BLOCK_SIZE);

    let mut out = vec![0u8; IVFC_HEADER_SIZE as usize];
    out[0x00..0x04].copy_from_slice(b"IVFC");
    out[0x04..0x08].copy_from_slice(&0x1_0000u32.to_le_bytes());
    out[0x08..0x0C].copy_from_slice(&(master_hash.len() as u32).to_le_bytes());
    out[0x0C..0x14].copy_from_slice(&level1_offset.to_le_bytes());
    out[0x14..0x1C].copy_from_slice(&(level1.len() as u64).to_le_bytes());
    out[0x1C..0x20].copy_from_slice(&IVFC_BLOCK_LOG2.to_le_bytes());
    out[0x24..0x2C].copy_from_slice(&level2_offset.to_le_bytes());
    out[0x2C..0x34].copy_from_slice(&(level2.len() as u64).to_le_bytes());
    out[0x34..0x38].copy_from_slice(&IVFC_BLOCK_LOG2.to_le_bytes());
    out[0x3C..0x44].copy_from_slice(&level3_offset.to_le_bytes());
    out[0x44..0x4C].copy_from_slice(&(level3.len() as u64).to_le_bytes());
    out[0x4C..0x50].copy_from_slice(&IVFC_BLOCK_LOG2.to_le_bytes());

    out.extend_from_slice(&master_hash);
    out.resize(level1_offset as usize, 0);
    out.extend_from_slice(&level1);
    out.resize(level2_offset as usize, 0);
    out.extend_from_slice(&level2);
    out.resize(level3_offset as usize, 0);
    out.extend_from_slice(&level3);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::SliceAccessor;
    use crate::formats::romfs::RomFs;

    fn sample_tree() -> BuildDir {
        BuildDir {
            name: String::new(),
            files: vec![BuildFile {
                name: "b.txt".to_string(),
                data: b"hello".to_vec(),
            }],
            dirs: vec![BuildDir {
                name: "sub".to_string(),
                files: vec![BuildFile {
                    name: "a.txt".to_string(),
                    data: b"bye".to_vec(),
                }],
                dirs: vec![],
            }],
        }
    }

    #[test]
    fn rebuild_parses_back_into_the_same_tree() {
        let bytes = rebuild(&sample_tree()).unwrap();
        let acc = SliceAccessor::new(bytes);
        let romfs = RomFs::parse(&acc).unwrap();

        assert_eq!(romfs.root.files.len(), 1);
        assert_eq!(romfs.root.files[0].name, "b.txt");
        assert_eq!(romfs.root.dirs.len(), 1);
        assert_eq!(romfs.root.dirs[0].name, "sub");
        assert_eq!(romfs.root.dirs[0].files[0].name, "a.txt");

        let data = romfs.slice_file(&acc, &romfs.root.files[0]).unwrap();
        assert_eq!(data.as_slice(), b"hello");
        let data = romfs.slice_file(&acc, &romfs.root.dirs[0].files[0]).unwrap();
        assert_eq!(data.as_slice(), b"bye");
    }

    #[test]
    fn rebuild_twice_is_byte_identical() {
        let tree = sample_tree();
        assert_eq!(rebuild(&tree).unwrap(), rebuild(&tree).unwrap());
    }

    #[test]
    fn duplicate_sibling_names_are_rejected() {
        let tree = BuildDir {
            name: String::new(),
            files: vec![
                BuildFile { name: "a.txt".to_string(), data: vec![] },
                BuildFile { name: "a.txt".to_string(), data: vec![1] },
            ],
            dirs: vec![],
        };
        assert!(matches!(rebuild(&tree), Err(Error::InvalidTree)));
    }

    #[test]
    fn bucket_count_is_a_prime_at_least_three() {
        assert_eq!(bucket_count_for(0), 3);
        assert_eq!(largest_prime_leq(10), 7);
    }
}
