//! ExeFS rebuild: the inverse of [`crate::formats::exefs`].
//!
//! Given an ordered `(name, bytes)` list, emit a fresh 0x200-byte header (10
//! descriptors + 0x20 reserved + 10 SHA-256 hashes, hashes stored in
//! *reverse* descriptor order per 3dbrew) followed by the payload, each
//! file's block padded up to the next media unit.

use sha2::{Digest, Sha256};

use crate::formats::exefs::{ExeFs, HEADER_SIZE, MAX_FILES};
use crate::utils::align_up;
use crate::{Error, Result};

const MEDIA_UNIT: u64 = 0x200;
const DESCRIPTOR_SIZE: usize = 0x10;
const HASHES_OFFSET: usize = 0xC0;
const HASH_SIZE: usize = 32;

/// Rebuild ExeFS bytes from an ordered file list. Fails with
/// [`Error::ExeFsCapacity`] if there are more than
/// [`MAX_FILES`] files or any name exceeds 8 bytes once encoded as ASCII.
pub fn rebuild(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    if files.len() > MAX_FILES {
        return Err(Error::ExeFsCapacity);
    }
    for (name, _) in files {
        if name.len() > 8 || !name.is_ascii() {
            return Err(Error::ExeFsCapacity);
        }
    }

    let mut header = vec![0u8; HEADER_SIZE as usize];
    let mut payload = Vec::new();
    let mut offset = 0u64;

    for (i, (name, bytes)) in files.iter().enumerate() {
        let d = i * DESCRIPTOR_SIZE;
        let mut name_bytes = [0u8; 8];
        name_bytes[..name.len()].copy_from_slice(name.as_bytes());
        header[d..d + 8].copy_from_slice(&name_bytes);
        header[d + 8..d + 12].copy_from_slice(&(offset as u32).to_le_bytes());
        header[d + 12..d + 16].copy_from_slice(&(bytes.len() as u32).to_le_bytes());

        let hash = Sha256::digest(bytes);
        let h = HASHES_OFFSET + (MAX_FILES - 1 - i) * HASH_SIZE;
        header[h..h + HASH_SIZE].copy_from_slice(hash.as_slice());

        let aligned = align_up(bytes.len() as u64, MEDIA_UNIT);
        payload.extend_from_slice(bytes);
        payload.resize(payload.len() + (aligned - bytes.len() as u64) as usize, 0);
        offset += aligned;
    }

    debug_assert_eq!(header.len(), HEADER_SIZE as usize);
    header.extend(payload);
    tracing::info!(files = files.len(), bytes = header.len(), "rebuilt exefs");
    Ok(header)
}

/// Rebuild from an already-decoded [`ExeFs`] plus the accessor its file
/// bytes live in - a convenience for "round-trip this partition unchanged".
pub fn rebuild_from_decoded(
    exefs: &ExeFs,
    accessor: &impl crate::accessor::ByteSource,
) -> Result<Vec<u8>> {
    let mut files = Vec::with_capacity(exefs.files.len());
    for file in &exefs.files {
        let data = exefs.slice_file(accessor, file)?;
        files.push((file.name.clone(), data.into_vec()));
    }
    rebuild(&files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::SliceAccessor;

    #[test]
    fn header_is_exactly_0x200_bytes() {
        let out = rebuild(&[("icon".to_string(), vec![1, 2, 3])]).unwrap();
        assert!(out.len() > HEADER_SIZE as usize);
        assert_eq!(&out[0x100..0x108], [0u8; 8]); // unused descriptor slot stays zeroed
    }

    #[test]
    fn rejects_more_than_ten_files() {
        let files: Vec<_> = (0..11).map(|i| (format!("f{i}"), vec![0u8])).collect();
        assert!(matches!(rebuild(&files), Err(Error::ExeFsCapacity)));
    }

    #[test]
    fn rejects_name_over_eight_bytes() {
        let files = vec![("toolongname".to_string(), vec![1u8])];
        assert!(matches!(rebuild(&files), Err(Error::ExeFsCapacity)));
    }

    #[test]
    fn roundtrips_through_the_decoder() {
        let files = vec![
            ("icon".to_string(), vec![0xAAu8; 37]),
            ("banner".to_string(), vec![0xBBu8; 512]),
        ];
        let bytes = rebuild(&files).unwrap();
        let acc = SliceAccessor::new(bytes);
        let exefs = ExeFs::parse(&acc).unwrap();

        assert_eq!(exefs.files.len(), 2);
        let icon = exefs.get("icon").unwrap();
        assert_eq!(exefs.slice_file(&acc, icon).unwrap().as_slice(), &[0xAAu8; 37][..]);
        let banner = exefs.get("banner").unwrap();
        assert_eq!(
            exefs.slice_file(&acc, banner).unwrap().as_slice(),
            &[0xBBu8; 512][..]
        );

        let hash = Sha256::digest([0xAAu8; 37]);
        assert_eq!(icon.hash.as_slice(), hash.as_slice());
    }

    #[test]
    fn rebuild_twice_is_byte_identical() {
        let files = vec![("code.bin".to_string(), vec![1, 2, 3, 4, 5])];
        assert_eq!(rebuild(&files).unwrap(), rebuild(&files).unwrap());
    }
}
