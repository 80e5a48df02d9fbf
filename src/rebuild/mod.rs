//! Serializing a (possibly overlayed) VFS tree back into valid ExeFS/RomFS
//! container bytes.
//!
//! This is the only direction other than decode: no CIA/NCSD/NCCH rebuilding
//! is supported, just the two sub-container formats whose trees a caller is
//! actually expected to edit.

pub mod exefs;
pub mod romfs;
