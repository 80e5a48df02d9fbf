//! Copy-on-write overlay: writes, deletes, and created directories that
//! shadow a read-only backing container without ever mutating it.
//!
//! The host filesystem capability ([`HostFs`]) has no directory-listing
//! operation (only `FileExists`/`DirectoryExists`/etc.), so the overlay
//! keeps its own in-memory index of every path it has written or explicitly
//! created - the scratch directory on disk holds the bytes, this index is
//! what enumeration walks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::host::HostFs;
use crate::vfs::path::{segments_start_with, NormalizedPath};
use crate::Result;

fn key(path: &NormalizedPath) -> String {
    path.display(false).to_ascii_lowercase()
}

/// Copy-on-write layer over a read-only backing view. Single-writer: all
/// mutating methods take `&self` and serialize through internal mutexes, so
/// a `Write(P)` happens-before any subsequent `Read(P)` regardless of which
/// thread issues either.
pub struct Overlay<H: HostFs> {
    host: H,
    scratch_dir: PathBuf,
    owns_scratch: bool,
    blacklist: Mutex<std::collections::HashSet<String>>,
    written: Mutex<HashMap<String, NormalizedPath>>,
    created_dirs: Mutex<HashMap<String, NormalizedPath>>,
}

impl<H: HostFs> Overlay<H> {
    pub fn new(host: H, scratch_dir: PathBuf, owns_scratch: bool) -> Self {
        Self {
            host,
            scratch_dir,
            owns_scratch,
            blacklist: Mutex::new(std::collections::HashSet::new()),
            written: Mutex::new(HashMap::new()),
            created_dirs: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn scratch_path(&self, path: &NormalizedPath) -> PathBuf {
        let mut p = self.scratch_dir.clone();
        for segment in path.segments() {
            p.push(segment.to_ascii_lowercase());
        }
        p
    }

    /// Pre-register an existing on-disk file as overlay content, without
    /// touching the blacklist or copying bytes. Used when a ROM is opened
    /// directly from a pre-extracted directory tree: every file already on
    /// disk is "written" overlay content from the VFS's point of view.
    pub fn adopt_existing(&self, path: &NormalizedPath, is_dir: bool) {
        if is_dir {
            self.created_dirs.lock().unwrap().insert(key(path), path.clone());
        } else {
            self.written.lock().unwrap().insert(key(path), path.clone());
        }
    }

    pub fn write(&self, path: &NormalizedPath, bytes: &[u8]) -> Result<()> {
        let k = key(path);
        self.host.write_all_bytes(&self.scratch_path(path), bytes)?;
        self.blacklist.lock().unwrap().remove(&k);
        self.written.lock().unwrap().insert(k, path.clone());
        tracing::debug!(path = %path.display(false), bytes = bytes.len(), "overlay write");
        Ok(())
    }

    pub fn delete(&self, path: &NormalizedPath) -> Result<()> {
        let k = key(path);
        let scratch_path = self.scratch_path(path);
        if self.host.file_exists(&scratch_path) {
            self.host.delete_file(&scratch_path)?;
        }
        self.written.lock().unwrap().remove(&k);
        self.blacklist.lock().unwrap().insert(k);
        tracing::debug!(path = %path.display(false), "overlay delete");
        Ok(())
    }

    pub fn create_directory(&self, path: &NormalizedPath) -> Result<()> {
        let k = key(path);
        self.host.create_directory(&self.scratch_path(path))?;
        self.blacklist.lock().unwrap().remove(&k);
        self.created_dirs.lock().unwrap().insert(k, path.clone());
        Ok(())
    }

    pub fn is_deleted(&self, path: &NormalizedPath) -> bool {
        self.blacklist.lock().unwrap().contains(&key(path))
    }

    /// Overlay bytes for `path`, if this path has overlay content (and is
    /// not itself deleted - callers are expected to check [`is_deleted`]
    /// first, since delete always wins).
    pub fn read(&self, path: &NormalizedPath) -> Option<Result<Vec<u8>>> {
        let k = key(path);
        if !self.written.lock().unwrap().contains_key(&k) {
            return None;
        }
        Some(self.host.read_all_bytes(&self.scratch_path(path)))
    }

    pub fn has_overlay_content(&self, path: &NormalizedPath) -> bool {
        self.written.lock().unwrap().contains_key(&key(path))
    }

    /// Whether `path` was explicitly created as a directory (distinct from a
    /// directory only implied by a deeper written path).
    pub fn is_created_directory(&self, path: &NormalizedPath) -> bool {
        self.created_dirs.lock().unwrap().contains_key(&key(path))
    }

    /// Immediate child file/directory names of `dir` known to the overlay
    /// (written files, explicitly created directories, and directories
    /// implied by a deeper written/created path), deduplicated
    /// case-insensitively. Deleted paths are excluded.
    pub fn children_of(&self, dir: &NormalizedPath) -> (Vec<String>, Vec<String>) {
        let prefix = dir.segments();
        let mut files = std::collections::HashSet::new();
        let mut dirs = std::collections::HashSet::new();
        let blacklist = self.blacklist.lock().unwrap();

        let written = self.written.lock().unwrap();
        for path in written.values() {
            if self.is_deleted_locked(&blacklist, path) {
                continue;
            }
            let segments = path.segments();
            if segments_start_with(segments, prefix) && segments.len() > prefix.len() {
                if segments.len() == prefix.len() + 1 {
                    files.insert(segments[prefix.len()].clone());
                } else {
                    dirs.insert(segments[prefix.len()].clone());
                }
            }
        }

        let created = self.created_dirs.lock().unwrap();
        for path in created.values() {
            if self.is_deleted_locked(&blacklist, path) {
                continue;
            }
            let segments = path.segments();
            if segments_start_with(segments, prefix) && segments.len() > prefix.len() {
                dirs.insert(segments[prefix.len()].clone());
            }
        }

        (files.into_iter().collect(), dirs.into_iter().collect())
    }

    fn is_deleted_locked(
        &self,
        blacklist: &std::collections::HashSet<String>,
        path: &NormalizedPath,
    ) -> bool {
        blacklist.contains(&key(path))
    }
}

impl<H: HostFs> Drop for Overlay<H> {
    fn drop(&mut self) {
        if self.owns_scratch {
            let _ = self.host.delete_directory(&self.scratch_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHostFs;

    fn path(s: &str) -> NormalizedPath {
        NormalizedPath::resolve(s, &NormalizedPath::root())
    }

    #[test]
    fn write_then_read_roundtrips() {
        let overlay = Overlay::new(MemoryHostFs::new(), PathBuf::from("/scratch"), true);
        let p = path("/RomFS/a/b.txt");
        overlay.write(&p, b"hello").unwrap();
        assert_eq!(overlay.read(&p).unwrap().unwrap(), b"hello");
        assert!(!overlay.is_deleted(&p));
    }

    #[test]
    fn delete_then_write_resurrects() {
        let overlay = Overlay::new(MemoryHostFs::new(), PathBuf::from("/scratch"), true);
        let p = path("/RomFS/foo.dat");
        overlay.write(&p, b"\x01\x02\x03").unwrap();
        overlay.delete(&p).unwrap();
        assert!(overlay.is_deleted(&p));
        assert!(overlay.read(&p).is_none());

        overlay.write(&p, b"\x01\x02\x03").unwrap();
        assert!(!overlay.is_deleted(&p));
        assert_eq!(overlay.read(&p).unwrap().unwrap(), b"\x01\x02\x03");
    }

    #[test]
    fn children_of_reports_nested_writes_once() {
        let overlay = Overlay::new(MemoryHostFs::new(), PathBuf::from("/scratch"), true);
        overlay.write(&path("/RomFS/a/b.txt"), b"1").unwrap();
        overlay.write(&path("/RomFS/a/c.txt"), b"2").unwrap();
        overlay.write(&path("/RomFS/d.txt"), b"3").unwrap();

        let (files, dirs) = overlay.children_of(&path("/RomFS"));
        assert_eq!(files.len(), 1);
        assert!(files.contains(&"d.txt".to_string()));
        assert_eq!(dirs.len(), 1);
        assert!(dirs.contains(&"a".to_string()));

        let (files, _) = overlay.children_of(&path("/RomFS/a"));
        assert_eq!(files.len(), 2);
    }
}
