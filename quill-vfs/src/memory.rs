//! In-memory file system implementation

use crate::error::{VfsError, VfsResult};
use crate::VirtualFileSystem;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// An in-memory file system implementation.
///
/// Files are stored in a `BTreeMap` keyed by normalized path. Directories are
/// implicit (any prefix of a stored file) or explicit (created through
/// `create_dir_all`). Clones share the same storage.
///
/// # Example
/// ```
/// use quill_vfs::{MemoryFileSystem, VirtualFileSystem};
/// use std::path::Path;
///
/// let fs = MemoryFileSystem::new();
/// fs.write_file(Path::new("/src/a.ql"), b"(def x 1)").unwrap();
/// assert!(fs.is_dir(Path::new("/src")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    inner: Arc<RwLock<Storage>>,
}

#[derive(Debug, Default)]
struct Storage {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemoryFileSystem {
    /// Create a new empty memory file system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new memory file system pre-populated with files.
    ///
    /// # Arguments
    /// * `files` - Iterator of (path, content) tuples
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        let fs = Self::new();
        if let Ok(mut storage) = fs.inner.write() {
            for (path, content) in files {
                let key = normalize(Path::new(path.as_ref()));
                storage.files.insert(key, content);
            }
        }
        fs
    }

    /// All stored file paths, sorted
    pub fn file_paths(&self) -> Vec<String> {
        match self.inner.read() {
            Ok(storage) => storage.files.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn read_storage(&self) -> VfsResult<std::sync::RwLockReadGuard<'_, Storage>> {
        self.inner.read().map_err(|_| VfsError::Custom {
            message: String::from("Lock poisoned"),
        })
    }

    fn write_storage(&self) -> VfsResult<std::sync::RwLockWriteGuard<'_, Storage>> {
        self.inner.write().map_err(|_| VfsError::Custom {
            message: String::from("Lock poisoned"),
        })
    }
}

/// Normalize a path string for internal storage.
/// Uses forward slashes consistently and drops trailing separators.
fn normalize(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('\\', "/");
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    s
}

fn dir_prefix(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{}/", dir)
    }
}

impl VirtualFileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let normalized = normalize(path);
        let storage = self.read_storage()?;
        storage
            .files
            .get(&normalized)
            .cloned()
            .ok_or(VfsError::NotFound { path: normalized })
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        let normalized = normalize(path);
        let mut storage = self.write_storage()?;
        if storage.dirs.contains(&normalized) {
            return Err(VfsError::InvalidPath {
                path: normalized,
                reason: "is a directory".to_string(),
            });
        }
        storage.files.insert(normalized, content.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let normalized = normalize(path);
        match self.inner.read() {
            Ok(storage) => storage.files.contains_key(&normalized),
            Err(_) => false,
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        let normalized = normalize(path);
        let storage = match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        if storage.dirs.contains(&normalized) {
            return true;
        }
        let prefix = dir_prefix(&normalized);
        storage
            .files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    fn create_dir_all(&self, path: &Path) -> VfsResult<()> {
        let normalized = normalize(path);
        let mut storage = self.write_storage()?;
        if storage.files.contains_key(&normalized) {
            return Err(VfsError::InvalidPath {
                path: normalized,
                reason: "is a file".to_string(),
            });
        }
        storage.dirs.insert(normalized);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut storage = self.write_storage()?;
        let content = storage
            .files
            .remove(&from)
            .ok_or(VfsError::NotFound { path: from })?;
        storage.files.insert(to, content);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> VfsResult<()> {
        let normalized = normalize(path);
        let prefix = dir_prefix(&normalized);
        let mut storage = self.write_storage()?;
        storage.files.retain(|key, _| !key.starts_with(&prefix));
        storage
            .dirs
            .retain(|key| key != &normalized && !key.starts_with(&prefix));
        Ok(())
    }
}
