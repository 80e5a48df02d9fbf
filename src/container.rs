//! Partition container: a uniform view over 1..8 NCCH partitions.
//!
//! NCSD and CIA inputs produce multi-partition containers; a bare NCCH,
//! ExeFS, or RomFS input is wrapped into a synthetic single-partition
//! container so the VFS namespace never has to special-case the input kind.
//! Partition decoding is lazy: a slot's ExeFS/RomFS sub-view is only parsed
//! the first time something asks for it ([`std::sync::OnceLock`] gives
//! "decode once, on first access" without hand-rolled double-checked
//! locking).

use std::sync::OnceLock;

use crate::accessor::{ByteSource, SliceAccessor};
use crate::formats::cia::Cia;
use crate::formats::exefs::ExeFs;
use crate::formats::ncch::{Ncch, Region};
use crate::formats::ncsd::Ncsd;
use crate::formats::romfs::RomFs;
use crate::{Error, Result};

pub const PARTITION_COUNT: usize = 8;

/// One NCCH partition slot: either a fully-parsed NCCH header with its
/// optional sub-regions, or a synthetic wrapper around a bare ExeFS/RomFS
/// input (see module docs).
pub struct NcchPartition {
    pub header: Option<Ncch>,
    accessor: SliceAccessor,
    exefs: OnceLock<Option<(SliceAccessor, ExeFs)>>,
    romfs: OnceLock<Option<(SliceAccessor, RomFs)>>,
}

impl NcchPartition {
    pub fn from_ncch(accessor: SliceAccessor) -> Result<Self> {
        let header = Ncch::parse(&accessor)?;
        Ok(Self {
            header: Some(header),
            accessor,
            exefs: OnceLock::new(),
            romfs: OnceLock::new(),
        })
    }

    pub fn synthetic_exefs(accessor: SliceAccessor) -> Result<Self> {
        let exefs = ExeFs::parse(&accessor)?;
        let cell = OnceLock::new();
        let _ = cell.set(Some((accessor.clone(), exefs)));
        Ok(Self {
            header: None,
            accessor,
            exefs: cell,
            romfs: OnceLock::new(),
        })
    }

    pub fn synthetic_romfs(accessor: SliceAccessor) -> Result<Self> {
        let romfs = RomFs::parse(&accessor)?;
        let cell = OnceLock::new();
        let _ = cell.set(Some((accessor.clone(), romfs)));
        Ok(Self {
            header: None,
            accessor,
            exefs: OnceLock::new(),
            romfs: cell,
        })
    }

    /// The partition's ExeFS sub-view and the accessor it was sliced from,
    /// decoded on first access.
    pub fn exefs(&self) -> Option<(&SliceAccessor, &ExeFs)> {
        self.exefs
            .get_or_init(|| {
                let region = self.header.as_ref()?.exefs?;
                let acc = self.accessor.slice(region.offset, region.size).ok()?;
                let exefs = ExeFs::parse(&acc).ok()?;
                Some((acc, exefs))
            })
            .as_ref()
            .map(|(a, e)| (a, e))
    }

    /// The partition's RomFS sub-view and the accessor it was sliced from,
    /// decoded on first access.
    pub fn romfs(&self) -> Option<(&SliceAccessor, &RomFs)> {
        self.romfs
            .get_or_init(|| {
                let region = self.header.as_ref()?.romfs?;
                let acc = self.accessor.slice(region.offset, region.size).ok()?;
                let romfs = RomFs::parse(&acc).ok()?;
                Some((acc, romfs))
            })
            .as_ref()
            .map(|(a, r)| (a, r))
    }

    /// Slice a raw region (Header/ExHeader/PlainRegion/Logo) out of this
    /// partition's own accessor.
    pub fn raw_region(&self, region: Option<Region>) -> Result<SliceAccessor> {
        let region = region.ok_or(Error::NotFound)?;
        self.accessor.slice(region.offset, region.size)
    }

    /// The raw 0x200-byte NCCH header, if this partition has one.
    pub fn header_bytes(&self) -> Result<SliceAccessor> {
        if self.header.is_none() {
            return Err(Error::NotFound);
        }
        self.accessor.slice(0, 0x200)
    }
}

/// Which top-level input produced a [`Container`] - drives whether
/// `NcsdHeader.bin` is synthesized and how partition 0 is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Ncsd,
    Cia,
    /// A bare NCCH, ExeFS, or RomFS input wrapped as a single synthetic partition.
    Single,
}

/// A uniform container over up to [`PARTITION_COUNT`] NCCH partitions.
pub struct Container {
    partitions: Vec<Option<NcchPartition>>,
    pub kind: ContainerKind,
    /// When true, only the `RomFS-<i>` index form is synthesized in the VFS
    /// namespace (no Manual/DownloadPlay/update aliases).
    pub is_dlc: bool,
}

impl Container {
    /// Access a partition slot by index; out-of-range or empty slots both
    /// yield `None`, never an error.
    pub fn partition(&self, index: usize) -> Option<&NcchPartition> {
        self.partitions.get(index).and_then(|p| p.as_ref())
    }

    pub fn from_ncsd(accessor: &SliceAccessor) -> Result<Self> {
        let ncsd = Ncsd::parse(accessor)?;
        let mut partitions = Vec::with_capacity(PARTITION_COUNT);
        for slot in ncsd.partitions {
            partitions.push(match slot {
                Some((offset, size)) => {
                    let slice = accessor.slice(offset, size)?;
                    Some(NcchPartition::from_ncch(slice)?)
                }
                None => None,
            });
        }
        Ok(Container {
            partitions,
            kind: ContainerKind::Ncsd,
            is_dlc: false,
        })
    }

    pub fn from_cia(accessor: &SliceAccessor) -> Result<Self> {
        let cia = Cia::parse(accessor)?;
        // Title type 0x0004008C denotes DLC titles (see retro-junk-nintendo's
        // title_type_from_id mapping); DLC CIAs expose RomFS-<i> only.
        let is_dlc = (cia.title_id >> 32) as u32 == 0x0004_008C;

        let mut partitions = vec![None; PARTITION_COUNT];
        for (i, chunk) in cia.content_chunks.iter().enumerate() {
            if chunk.content_index as usize >= PARTITION_COUNT {
                continue;
            }
            let slice = cia.slice_content(accessor, i)?;
            partitions[chunk.content_index as usize] = Some(NcchPartition::from_ncch(slice)?);
        }

        Ok(Container {
            partitions,
            kind: ContainerKind::Cia,
            is_dlc,
        })
    }

    pub fn from_ncch(accessor: SliceAccessor) -> Result<Self> {
        let mut partitions = vec![None; PARTITION_COUNT];
        partitions[0] = Some(NcchPartition::from_ncch(accessor)?);
        Ok(Container {
            partitions,
            kind: ContainerKind::Single,
            is_dlc: false,
        })
    }

    pub fn from_exefs(accessor: SliceAccessor) -> Result<Self> {
        let mut partitions = vec![None; PARTITION_COUNT];
        partitions[0] = Some(NcchPartition::synthetic_exefs(accessor)?);
        Ok(Container {
            partitions,
            kind: ContainerKind::Single,
            is_dlc: false,
        })
    }

    pub fn from_romfs(accessor: SliceAccessor) -> Result<Self> {
        let mut partitions = vec![None; PARTITION_COUNT];
        partitions[0] = Some(NcchPartition::synthetic_romfs(accessor)?);
        Ok(Container {
            partitions,
            kind: ContainerKind::Single,
            is_dlc: false,
        })
    }
}
