//! NCCH partition parsing.
//!
//! A 0x200-byte header (magic `NCCH` at +0x100) lists media-unit-aligned
//! offset/size pairs for each of the optional sub-regions - ExHeader, Plain
//! Region, Logo, ExeFS, RomFS. A region with offset 0 is absent.

use crate::accessor::ByteSource;
use crate::utils::{ascii_string, check_magic, le_u32, le_u64};
use crate::{Error, Result};

pub const MEDIA_UNIT: u64 = 0x200;
const NCCH_MAGIC: &[u8; 4] = b"NCCH";

/// A region within an NCCH partition, expressed as a byte offset/length pair
/// relative to the start of the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: u64,
    pub size: u64,
}

impl Region {
    fn from_media_units(offset_mu: u32, size_mu: u32) -> Option<Self> {
        if size_mu == 0 {
            return None;
        }
        Some(Region {
            offset: offset_mu as u64 * MEDIA_UNIT,
            size: size_mu as u64 * MEDIA_UNIT,
        })
    }
}

/// Parsed NCCH header plus the sub-region table.
#[derive(Debug, Clone)]
pub struct Ncch {
    pub partition_id: u64,
    pub maker_code: String,
    pub version: u16,
    pub program_id: u64,
    pub product_code: String,
    pub no_crypto: bool,
    pub content_platform: u8,
    pub content_type_flags: u8,
    pub crypto_method: u8,
    pub exheader_size: u32,
    /// ExHeader + AccessDesc region (0x800 + 0x400 by 3dbrew convention:
    /// twice the declared `exheader_size`).
    pub exheader: Option<Region>,
    pub plain_region: Option<Region>,
    pub logo: Option<Region>,
    pub exefs: Option<Region>,
    pub romfs: Option<Region>,
}

impl Ncch {
    /// Read only the magic at +0x100; never errors on a mismatch.
    pub fn probe(accessor: &impl ByteSource) -> bool {
        if accessor.len() < 0x200 {
            return false;
        }
        let Ok(buf) = accessor.read(0x100, 4) else {
            return false;
        };
        buf.as_slice() == NCCH_MAGIC
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse(accessor: &impl ByteSource) -> Result<Self> {
        let buf = accessor.read(0, 0x200)?;
        check_magic(&buf, 0x100, NCCH_MAGIC)?;

        let partition_id = le_u64(&buf, 0x108);
        let maker_code = ascii_string(&buf, 0x110, 2)?;
        let version = crate::utils::le_u16(&buf, 0x112);
        let program_id = le_u64(&buf, 0x118);
        let product_code = ascii_string(&buf, 0x150, 16)?;

        let exheader_size = le_u32(&buf, 0x180);

        let flags = &buf[0x188..0x190];
        let crypto_method = flags[3];
        let content_platform = flags[4];
        let content_type_flags = flags[5];
        let no_crypto = flags[7] & 0x04 != 0;

        let plain_region = Region::from_media_units(le_u32(&buf, 0x190), le_u32(&buf, 0x194));
        let logo = Region::from_media_units(le_u32(&buf, 0x198), le_u32(&buf, 0x19C));
        let exefs = Region::from_media_units(le_u32(&buf, 0x1A0), le_u32(&buf, 0x1A4));
        let romfs = Region::from_media_units(le_u32(&buf, 0x1B0), le_u32(&buf, 0x1B4));

        let exheader = if exheader_size == 0 {
            None
        } else {
            Some(Region {
                offset: 0x200,
                size: exheader_size as u64 * 2,
            })
        };

        Ok(Ncch {
            partition_id,
            maker_code,
            version,
            program_id,
            product_code,
            no_crypto,
            content_platform,
            content_type_flags,
            crypto_method,
            exheader_size,
            exheader,
            plain_region,
            logo,
            exefs,
            romfs,
        })
    }

    /// Slice out a region, erroring with [`Error::NotFound`] if absent.
    pub fn slice_region(
        &self,
        accessor: &impl ByteSource,
        region: Option<Region>,
    ) -> Result<crate::accessor::SliceAccessor> {
        let region = region.ok_or(Error::NotFound)?;
        accessor.slice(region.offset, region.size)
    }
}
