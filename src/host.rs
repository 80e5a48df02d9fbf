//! Host filesystem capability.
//!
//! The overlay layer and the extraction entry points never touch
//! `std::fs` directly; they go through this trait, the same "generic over a
//! capability, not a concrete type" shape the rest of the crate follows for
//! byte access. Tests substitute [`MemoryHostFs`] for a real disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{Error, Result};

/// Minimal host filesystem surface the overlay needs.
pub trait HostFs {
    fn file_exists(&self, path: &Path) -> bool;
    fn directory_exists(&self, path: &Path) -> bool;
    fn create_directory(&self, path: &Path) -> Result<()>;
    fn read_all_bytes(&self, path: &Path) -> Result<Vec<u8>>;
    fn write_all_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()>;
    fn delete_directory(&self, path: &Path) -> Result<()>;
    fn delete_file(&self, path: &Path) -> Result<()>;
    fn get_temp_directory(&self) -> PathBuf;
}

/// A [`HostFs`] backed by the real disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealHostFs;

impl HostFs for RealHostFs {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn read_all_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn write_all_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn delete_directory(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn get_temp_directory(&self) -> PathBuf {
        std::env::temp_dir()
    }
}

/// A [`HostFs`] backed by an in-memory map, used by the scratch directory in
/// tests and wherever a real disk isn't wanted.
#[derive(Debug, Default)]
pub struct MemoryHostFs {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<std::collections::HashSet<PathBuf>>,
}

impl MemoryHostFs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostFs for MemoryHostFs {
    fn file_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn directory_exists(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().contains(path)
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        let mut dirs = self.dirs.lock().unwrap();
        let mut cur = PathBuf::new();
        for component in path.components() {
            cur.push(component);
            dirs.insert(cur.clone());
        }
        Ok(())
    }

    fn read_all_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn write_all_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_directory(parent)?;
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn delete_directory(&self, path: &Path) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        files.retain(|p, _| !p.starts_with(path));
        let mut dirs = self.dirs.lock().unwrap();
        dirs.retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    fn get_temp_directory(&self) -> PathBuf {
        PathBuf::from("/tmp/cartkit-memfs")
    }
}
