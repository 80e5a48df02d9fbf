//! NCSD (CCI / game card image) header parsing.
//!
//! Magic `NCSD` at offset 0x100, followed by a table of 8 partition entries
//! (offset, length) in media units. Partition 0 is the main executable NCCH;
//! slots 1-7 map to Manual, DownloadPlay, two reserved slots, and the N3DS
//! / O3DS update partitions. Partition decoding itself is the caller's job -
//! this module only exposes the table.

use crate::accessor::ByteSource;
use crate::utils::{check_magic, le_u32};
use crate::Result;

const NCSD_MAGIC: &[u8; 4] = b"NCSD";
pub const MEDIA_UNIT: u64 = 0x200;
pub const PARTITION_COUNT: usize = 8;

/// Byte offset/length of one of the 8 NCCH partition slots, `None` if empty.
pub type PartitionSlot = Option<(u64, u64)>;

#[derive(Debug, Clone)]
pub struct Ncsd {
    pub image_size_mu: u32,
    pub media_id: u64,
    pub partitions: [PartitionSlot; PARTITION_COUNT],
}

impl Ncsd {
    pub fn probe(accessor: &impl ByteSource) -> bool {
        if accessor.len() < 0x200 {
            return false;
        }
        let Ok(buf) = accessor.read(0x100, 4) else {
            return false;
        };
        buf.as_slice() == NCSD_MAGIC
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse(accessor: &impl ByteSource) -> Result<Self> {
        let buf = accessor.read(0, 0x200)?;
        check_magic(&buf, 0x100, NCSD_MAGIC)?;

        let image_size_mu = le_u32(&buf, 0x104);
        let media_id = crate::utils::le_u64(&buf, 0x108);

        let mut partitions: [PartitionSlot; PARTITION_COUNT] = [None; PARTITION_COUNT];
        for (i, slot) in partitions.iter_mut().enumerate() {
            let entry_offset = 0x120 + i * 8;
            let offset_mu = le_u32(&buf, entry_offset);
            let length_mu = le_u32(&buf, entry_offset + 4);
            if length_mu != 0 {
                *slot = Some((offset_mu as u64 * MEDIA_UNIT, length_mu as u64 * MEDIA_UNIT));
            }
        }

        Ok(Ncsd {
            image_size_mu,
            media_id,
            partitions,
        })
    }
}

/// Partition-index aliases for the top-level VFS names. Indices 3, 4, 5 are
/// reserved/unknown upstream; exposed verbatim as `RomFS-<i>` with no
/// special handling (see DESIGN.md).
pub const ALIAS_ROMFS: usize = 0;
pub const ALIAS_MANUAL: usize = 1;
pub const ALIAS_DOWNLOAD_PLAY: usize = 2;
pub const ALIAS_N3DS_UPDATE: usize = 6;
pub const ALIAS_O3DS_UPDATE: usize = 7;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::SliceAccessor;

    fn synthetic_ncsd(partitions: &[(u32, u32); PARTITION_COUNT]) -> Vec<u8> {
        let mut buf = vec![0u8; 0x200];
        buf[0x100..0x104].copy_from_slice(b"NCSD");
        for (i, (offset, len)) in partitions.iter().enumerate() {
            let e = 0x120 + i * 8;
            buf[e..e + 4].copy_from_slice(&offset.to_le_bytes());
            buf[e + 4..e + 8].copy_from_slice(&len.to_le_bytes());
        }
        buf
    }

    #[test]
    fn parses_partition_table() {
        let mut table = [(0u32, 0u32); PARTITION_COUNT];
        table[0] = (0x10, 0x100);
        table[1] = (0x110, 0x10);
        table[6] = (0x200, 0x10);
        let acc = SliceAccessor::new(synthetic_ncsd(&table));
        let ncsd = Ncsd::parse(&acc).unwrap();
        assert!(ncsd.partitions[0].is_some());
        assert!(ncsd.partitions[1].is_some());
        assert!(ncsd.partitions[2].is_none());
        assert!(ncsd.partitions[6].is_some());
        assert!(ncsd.partitions[7].is_none());
        let (offset, len) = ncsd.partitions[0].unwrap();
        assert_eq!(offset, 0x10 * MEDIA_UNIT);
        assert_eq!(len, 0x100 * MEDIA_UNIT);
    }

    #[test]
    fn probe_requires_magic() {
        let acc = SliceAccessor::new(vec![0u8; 0x200]);
        assert!(!Ncsd::probe(&acc));
    }
}
