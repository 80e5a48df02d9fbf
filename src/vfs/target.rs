//! What a resolved path points at.
//!
//! Collapses "file in ExeFS vs file in RomFS vs a synthesized region vs an
//! NDS FAT entry" into one sum type, so [`crate::vfs::namespace`] never has
//! to hand back four different file-ish shapes.

use crate::accessor::SliceAccessor;

/// The result of resolving a path against the read-only backing view.
#[derive(Debug)]
pub enum ResolveTarget {
    /// A file, already sliced down to its exact byte range (ARM9 footer
    /// extension, if any, has already been folded into the slice).
    File(SliceAccessor),
    /// A directory - ExeFS/RomFS subtree, DS `data`/`overlay` slot, or the
    /// namespace root.
    Directory,
}
