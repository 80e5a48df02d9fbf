//! Virtual file system: path normalization, the read-only namespace view,
//! and the copy-on-write overlay that sits on top of it.

pub mod namespace;
pub mod overlay;
pub mod path;
pub mod target;
