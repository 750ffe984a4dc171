//! Storage probe used by pack discovery and validation
//!
//! The lifecycle controller only ever asks three questions of storage. Both
//! the real filesystem and the in-memory tree answer them the same way, so
//! tests run against [`MemoryStorage`] and the binary against [`FsStorage`].

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
pub trait StorageProbe: Send + Sync {
    /// True for files and directories alike.
    fn file_exists(&self, path: &Path) -> bool;

    /// Entry names of a directory, sorted.
    fn list_directory(&self, path: &Path) -> io::Result<Vec<String>>;

    fn file_size(&self, path: &Path) -> io::Result<u64>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorage;

impl StorageProbe for FsStorage {
    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_directory(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }
}

/// Fixed in-memory tree. Adding a file creates its parent directories.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    files: BTreeMap<PathBuf, u64>,
    directories: BTreeSet<PathBuf>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, size: u64) -> Self {
        self.add_file(path, size);
        self
    }

    pub fn with_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.add_directory(path);
        self
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>, size: u64) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_directory(parent);
        }
        self.files.insert(path, size);
    }

    pub fn add_directory(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.directories.insert(ancestor.to_path_buf());
        }
    }
}

impl StorageProbe for MemoryStorage {
    fn file_exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn list_directory(&self, path: &Path) -> io::Result<Vec<String>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such directory: {}", path.display()),
            ));
        }
        let children: BTreeSet<String> = self
            .files
            .keys()
            .chain(self.directories.iter())
            .filter(|entry| entry.parent() == Some(path))
            .filter_map(|entry| entry.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        Ok(children.into_iter().collect())
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        self.files.get(path).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }
}
