//! Parsers for Nintendo 3DS and DS ROM container formats.
//!
//! Each submodule targets one format family. All parsers follow the same
//! conventions:
//!
//! * **Generic over** [`crate::accessor::ByteSource`] - pass a
//!   [`crate::accessor::SliceAccessor`] or anything else that implements the
//!   trait. Parsers never assume a concrete buffer type.
//! * **Probe, then load** - each decoder exposes a `probe` that reads only
//!   enough bytes to disambiguate (usually a magic number at a fixed offset)
//!   and never fails on a non-matching input, plus a `parse`/`load` that
//!   builds the full in-memory description.
//! * **Metadata only** - parsing builds an index of offsets and lengths;
//!   file data is fetched lazily through the accessor, never eagerly copied.
//!
//! ## Format overview
//!
//! | Module    | Format | Description |
//! |-----------|--------|-------------|
//! | [`ncsd`]  | NCSD / CCI | Game card image; table of up to 8 NCCH partitions |
//! | [`cia`]   | CIA | Installable archive; ticket + TMD + NCCH content chunks |
//! | [`ncch`]  | NCCH | 3DS partition: header, ExHeader, Plain Region, Logo, ExeFS, RomFS |
//! | [`exefs`] | ExeFS | Fixed-capacity archive of up to 10 executable-related files |
//! | [`romfs`] | RomFS | IVFC hash-tree-backed read-only filesystem holding game assets |
//! | [`nds`]   | NDS | DS cartridge image: header, FAT, FNT, ARM9/ARM7 overlays |

pub mod cia;
pub mod exefs;
pub mod ncch;
pub mod ncsd;
pub mod nds;
pub mod romfs;
