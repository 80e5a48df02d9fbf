//! Top-level facade: opens a 3DS or DS container (or a pre-extracted
//! directory tree) and exposes one read/write virtual file system over it.
//!
//! [`Rom::open_bytes`] probes formats in order NCSD, CIA, bare NCCH, bare
//! RomFS, bare ExeFS, then NDS, and keeps whichever [`Backing`] matched.
//! Every query merges that read-only backing with the [`Overlay`] sitting on
//! top of it; the overlay always wins, and a blacklisted path is never
//! visible regardless of what the backing says.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::accessor::SliceAccessor;
use crate::container::Container;
use crate::formats::cia::Cia;
use crate::formats::exefs::ExeFs;
use crate::formats::ncch::Ncch;
use crate::formats::ncsd::Ncsd;
use crate::formats::nds::Nds;
use crate::formats::romfs::RomFs;
use crate::host::{HostFs, RealHostFs};
use crate::rebuild;
use crate::vfs::namespace;
use crate::vfs::overlay::Overlay;
use crate::vfs::path::{glob_match, NormalizedPath};
use crate::vfs::target::ResolveTarget;
use crate::{Error, Result};

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The read-only view a [`Rom`] was opened against.
enum Backing {
    ThreeDs { accessor: SliceAccessor, container: Container },
    Ds { accessor: SliceAccessor, nds: Nds },
    /// A pre-extracted directory tree: there is nothing read-only
    /// underneath, every path lives in the overlay from the start.
    Directory,
}

/// Runs the NCSD → CIA → NCCH → RomFS → ExeFS → NDS probe chain, logging
/// which decoder claimed the input (or that none did).
#[tracing::instrument(level = "debug", skip_all, fields(bytes = accessor.len()))]
fn detect_backing(accessor: SliceAccessor) -> Result<Backing> {
    if Ncsd::probe(&accessor) {
        tracing::info!(format = "ncsd", "container detected");
        let container = Container::from_ncsd(&accessor)?;
        return Ok(Backing::ThreeDs { accessor, container });
    }
    if Cia::probe(&accessor) {
        tracing::info!(format = "cia", "container detected");
        let container = Container::from_cia(&accessor)?;
        return Ok(Backing::ThreeDs { accessor, container });
    }
    if Ncch::probe(&accessor) {
        tracing::info!(format = "ncch", "container detected");
        let container = Container::from_ncch(accessor.clone())?;
        return Ok(Backing::ThreeDs { accessor, container });
    }
    if RomFs::probe(&accessor) {
        tracing::info!(format = "romfs", "container detected");
        let container = Container::from_romfs(accessor.clone())?;
        return Ok(Backing::ThreeDs { accessor, container });
    }
    if ExeFs::probe(&accessor) {
        tracing::info!(format = "exefs", "container detected");
        let container = Container::from_exefs(accessor.clone())?;
        return Ok(Backing::ThreeDs { accessor, container });
    }
    if Nds::probe(&accessor) {
        tracing::info!(format = "nds", "container detected");
        let nds = Nds::parse(&accessor)?;
        return Ok(Backing::Ds { accessor, nds });
    }
    tracing::warn!("no decoder claimed the input");
    Err(Error::UnsupportedFormat)
}

fn dedup_case_insensitive(base: Vec<String>, extra: Vec<String>) -> Vec<String> {
    let mut seen: std::collections::HashSet<String> =
        base.iter().map(|s| s.to_ascii_lowercase()).collect();
    let mut out = base;
    for name in extra {
        if seen.insert(name.to_ascii_lowercase()) {
            out.push(name);
        }
    }
    out
}

fn adopt_directory_tree(overlay: &Overlay<RealHostFs>, real_dir: &Path, vfs_path: &NormalizedPath) -> Result<()> {
    for entry in std::fs::read_dir(real_dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let child = vfs_path.join(&name);
        if file_type.is_dir() {
            overlay.adopt_existing(&child, true);
            adopt_directory_tree(overlay, &entry.path(), &child)?;
        } else if file_type.is_file() {
            overlay.adopt_existing(&child, false);
        }
    }
    Ok(())
}

/// An opened ROM: a read-only backing view plus a copy-on-write overlay.
///
/// `H` is the host filesystem capability the overlay writes through;
/// defaults to the real disk. Tests substitute [`crate::host::MemoryHostFs`]
/// via [`Rom::open_bytes_with_host`] so no write ever touches a real temp
/// directory.
pub struct Rom<H: HostFs = RealHostFs> {
    backing: Backing,
    overlay: Overlay<H>,
    cwd: NormalizedPath,
}

impl Rom<RealHostFs> {
    /// Detect and open a container from an in-memory image.
    pub fn open_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::open_bytes_with_host(bytes, RealHostFs)
    }

    /// Open a pre-extracted directory tree. Every file already on disk is
    /// adopted as overlay content up front; there is no backing container
    /// to fall back to.
    pub fn open_directory(root: &Path) -> Result<Self> {
        let overlay = Overlay::new(RealHostFs, root.to_path_buf(), false);
        adopt_directory_tree(&overlay, root, &NormalizedPath::root())?;
        Ok(Rom {
            backing: Backing::Directory,
            overlay,
            cwd: NormalizedPath::root(),
        })
    }
}

impl<H: HostFs> Rom<H> {
    /// Detect and open a container from an in-memory image, writing overlay
    /// content through `host` rather than the real disk.
    pub fn open_bytes_with_host(bytes: Vec<u8>, host: H) -> Result<Self> {
        let accessor = SliceAccessor::new(bytes);
        let backing = detect_backing(accessor)?;
        let scratch_dir = host.get_temp_directory().join(format!(
            "cartkit-scratch-{}-{}",
            std::process::id(),
            SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        Ok(Rom {
            backing,
            overlay: Overlay::new(host, scratch_dir, true),
            cwd: NormalizedPath::root(),
        })
    }

    fn resolve(&self, path: &NormalizedPath) -> Result<ResolveTarget> {
        if self.overlay.is_deleted(path) {
            return Err(Error::NotFound);
        }
        if self.overlay.has_overlay_content(path) {
            let bytes = self.overlay.read(path).ok_or(Error::NotFound)??;
            return Ok(ResolveTarget::File(SliceAccessor::new(bytes)));
        }
        match &self.backing {
            Backing::Directory => {
                if path.is_root() || self.overlay.is_created_directory(path) {
                    return Ok(ResolveTarget::Directory);
                }
                let (files, dirs) = self.overlay.children_of(path);
                if files.is_empty() && dirs.is_empty() {
                    Err(Error::NotFound)
                } else {
                    Ok(ResolveTarget::Directory)
                }
            }
            Backing::ThreeDs { accessor, container } => {
                namespace::resolve_threeds(container, accessor, path.segments())
            }
            Backing::Ds { accessor, nds } => namespace::resolve_ds(accessor, nds, path.segments()),
        }
    }

    /// Immediate (file names, directory names) children of `dir`, backing
    /// and overlay merged, blacklisted and overlay-shadowed entries already
    /// resolved.
    fn children(&self, dir: &NormalizedPath) -> Result<(Vec<String>, Vec<String>)> {
        match self.resolve(dir)? {
            ResolveTarget::File(_) => return Err(Error::NotSupported("path is a file")),
            ResolveTarget::Directory => {}
        }

        let (backing_files, backing_dirs) = match &self.backing {
            Backing::Directory => (Vec::new(), Vec::new()),
            Backing::ThreeDs { container, .. } => namespace::list_children_threeds(container, dir.segments())?,
            Backing::Ds { nds, .. } => namespace::list_children_ds(nds, dir.segments())?,
        };
        let backing_files: Vec<String> = backing_files
            .into_iter()
            .filter(|n| !self.overlay.is_deleted(&dir.join(n)))
            .collect();
        let backing_dirs: Vec<String> = backing_dirs
            .into_iter()
            .filter(|n| !self.overlay.is_deleted(&dir.join(n)))
            .collect();

        let (overlay_files, overlay_dirs) = self.overlay.children_of(dir);
        let mut files = dedup_case_insensitive(backing_files, overlay_files);
        let mut dirs = dedup_case_insensitive(backing_dirs, overlay_dirs);
        files.sort();
        dirs.sort();
        Ok((files, dirs))
    }

    fn walk(
        &self,
        dir: &NormalizedPath,
        pattern: &str,
        top_directory_only: bool,
        want_dirs: bool,
        out: &mut Vec<String>,
    ) -> Result<()> {
        let (files, dirs) = self.children(dir)?;
        if want_dirs {
            for name in &dirs {
                if glob_match(pattern, name) {
                    out.push(dir.join(name).display(true));
                }
            }
        } else {
            for name in &files {
                if glob_match(pattern, name) {
                    out.push(dir.join(name).display(false));
                }
            }
        }
        if !top_directory_only {
            for name in &dirs {
                self.walk(&dir.join(name), pattern, top_directory_only, want_dirs, out)?;
            }
        }
        Ok(())
    }

    /// List file paths under `dir` matching `pattern` (`*`/`?` glob,
    /// case-insensitive). Recurses depth-first unless `top_directory_only`.
    pub fn get_files(&self, dir: &str, pattern: &str, top_directory_only: bool) -> Result<Vec<String>> {
        let base = NormalizedPath::resolve(dir, &self.cwd);
        let mut out = Vec::new();
        self.walk(&base, pattern, top_directory_only, false, &mut out)?;
        Ok(out)
    }

    /// List directory paths under `dir` matching `pattern`, trailing-slash
    /// formatted. Recurses depth-first unless `top_directory_only`.
    pub fn get_directories(&self, dir: &str, pattern: &str, top_directory_only: bool) -> Result<Vec<String>> {
        let base = NormalizedPath::resolve(dir, &self.cwd);
        let mut out = Vec::new();
        self.walk(&base, pattern, top_directory_only, true, &mut out)?;
        Ok(out)
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let p = NormalizedPath::resolve(path, &self.cwd);
        match self.resolve(&p)? {
            ResolveTarget::File(acc) => Ok(acc.into_vec()),
            ResolveTarget::Directory => Err(Error::NotSupported("path is a directory")),
        }
    }

    pub fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let p = NormalizedPath::resolve(path, &self.cwd);
        self.overlay.write(&p, bytes)
    }

    pub fn create_directory(&self, path: &str) -> Result<()> {
        let p = NormalizedPath::resolve(path, &self.cwd);
        self.overlay.create_directory(&p)
    }

    pub fn delete_file(&self, path: &str) -> Result<()> {
        let p = NormalizedPath::resolve(path, &self.cwd);
        match self.resolve(&p)? {
            ResolveTarget::Directory => Err(Error::NotSupported("use delete_directory for directories")),
            ResolveTarget::File(_) => self.overlay.delete(&p),
        }
    }

    /// Delete every file under `path` (recursively discovered through the
    /// merged backing+overlay view) and the directory itself.
    pub fn delete_directory(&self, path: &str) -> Result<()> {
        let p = NormalizedPath::resolve(path, &self.cwd);
        match self.resolve(&p)? {
            ResolveTarget::File(_) => return Err(Error::NotSupported("use delete_file for files")),
            ResolveTarget::Directory => {}
        }
        let mut stack = vec![p.clone()];
        while let Some(dir) = stack.pop() {
            let (files, dirs) = self.children(&dir)?;
            for f in files {
                self.overlay.delete(&dir.join(&f))?;
            }
            for d in dirs {
                stack.push(dir.join(&d));
            }
        }
        self.overlay.delete(&p)
    }

    pub fn file_exists(&self, path: &str) -> bool {
        let p = NormalizedPath::resolve(path, &self.cwd);
        matches!(self.resolve(&p), Ok(ResolveTarget::File(_)))
    }

    pub fn directory_exists(&self, path: &str) -> bool {
        let p = NormalizedPath::resolve(path, &self.cwd);
        matches!(self.resolve(&p), Ok(ResolveTarget::Directory))
    }

    pub fn set_current_directory(&mut self, path: &str) -> Result<()> {
        let p = NormalizedPath::resolve(path, &self.cwd);
        match self.resolve(&p)? {
            ResolveTarget::Directory => {
                self.cwd = p;
                Ok(())
            }
            ResolveTarget::File(_) => Err(Error::NotSupported("not a directory")),
        }
    }

    pub fn current_directory(&self) -> String {
        self.cwd.display(true)
    }

    fn read_file_at(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        match self.resolve(path)? {
            ResolveTarget::File(acc) => Ok(acc.into_vec()),
            ResolveTarget::Directory => Err(Error::NotSupported("expected a file")),
        }
    }

    fn build_tree(&self, path: &NormalizedPath, name: &str) -> Result<rebuild::romfs::BuildDir> {
        let (files, dirs) = self.children(path)?;
        let mut build_files = Vec::with_capacity(files.len());
        for f in &files {
            build_files.push(rebuild::romfs::BuildFile {
                name: f.clone(),
                data: self.read_file_at(&path.join(f))?,
            });
        }
        let mut build_dirs = Vec::with_capacity(dirs.len());
        for d in &dirs {
            build_dirs.push(self.build_tree(&path.join(d), d)?);
        }
        Ok(rebuild::romfs::BuildDir {
            name: name.to_string(),
            dirs: build_dirs,
            files: build_files,
        })
    }

    /// Serialize the (possibly overlayed) tree at `romfs_dir` back into a
    /// fresh RomFS image. See [`crate::rebuild::romfs`].
    pub fn rebuild_romfs(&self, romfs_dir: &str) -> Result<Vec<u8>> {
        let base = NormalizedPath::resolve(romfs_dir, &self.cwd);
        match self.resolve(&base)? {
            ResolveTarget::Directory => {}
            ResolveTarget::File(_) => return Err(Error::NotSupported("not a romfs directory")),
        }
        let root = self.build_tree(&base, "")?;
        rebuild::romfs::rebuild(&root)
    }

    /// Serialize the (possibly overlayed) flat file list at `exefs_dir`
    /// back into a fresh ExeFS image. See [`crate::rebuild::exefs`].
    pub fn rebuild_exefs(&self, exefs_dir: &str) -> Result<Vec<u8>> {
        let base = NormalizedPath::resolve(exefs_dir, &self.cwd);
        match self.resolve(&base)? {
            ResolveTarget::Directory => {}
            ResolveTarget::File(_) => return Err(Error::NotSupported("not an exefs directory")),
        }
        let (files, _dirs) = self.children(&base)?;
        let mut entries = Vec::with_capacity(files.len());
        for f in &files {
            entries.push((f.clone(), self.read_file_at(&base.join(f))?));
        }
        rebuild::exefs::rebuild(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHostFs;

    fn synthetic_exefs(files: &[(&str, &[u8])]) -> Vec<u8> {
        let owned: Vec<(String, Vec<u8>)> = files.iter().map(|(n, d)| (n.to_string(), d.to_vec())).collect();
        rebuild::exefs::rebuild(&owned).unwrap()
    }

    #[test]
    fn opens_bare_exefs_and_lists_flat_files() {
        let image = synthetic_exefs(&[("icon", b"ICON"), ("banner", b"BANNER")]);
        let rom = Rom::open_bytes_with_host(image, MemoryHostFs::new()).unwrap();
        assert!(rom.directory_exists("/ExeFS"));
        let files = rom.get_files("/ExeFS", "*", false).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(rom.read_file("/ExeFS/icon").unwrap(), b"ICON");
    }

    #[test]
    fn write_then_read_shadows_backing() {
        let image = synthetic_exefs(&[("icon", b"ICON")]);
        let rom = Rom::open_bytes_with_host(image, MemoryHostFs::new()).unwrap();
        rom.write_file("/ExeFS/icon", b"NEWICON").unwrap();
        assert_eq!(rom.read_file("/ExeFS/icon").unwrap(), b"NEWICON");
    }

    #[test]
    fn delete_then_write_resurrects_through_rom() {
        let image = synthetic_exefs(&[("icon", b"ICON")]);
        let rom = Rom::open_bytes_with_host(image, MemoryHostFs::new()).unwrap();
        rom.delete_file("/ExeFS/icon").unwrap();
        assert!(!rom.file_exists("/ExeFS/icon"));
        rom.write_file("/ExeFS/icon", b"BACK").unwrap();
        assert!(rom.file_exists("/ExeFS/icon"));
        assert_eq!(rom.read_file("/ExeFS/icon").unwrap(), b"BACK");
    }

    #[test]
    fn unrecognized_bytes_are_unsupported_format() {
        let err = Rom::open_bytes_with_host(vec![0u8; 16], MemoryHostFs::new()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat));
    }
}
