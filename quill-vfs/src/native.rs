//! Native file system implementation

use crate::error::{VfsError, VfsResult};
use crate::VirtualFileSystem;
use std::path::Path;

/// A native OS file system implementation.
///
/// This wraps `std::fs` operations and provides the `VirtualFileSystem`
/// interface for local file access.
#[derive(Debug, Clone, Default)]
pub struct NativeFileSystem;

impl NativeFileSystem {
    /// Create a new native file system.
    pub fn new() -> Self {
        Self
    }
}

fn map_io(path: &Path, e: std::io::Error) -> VfsError {
    match e.kind() {
        std::io::ErrorKind::NotFound => VfsError::NotFound {
            path: path.to_string_lossy().to_string(),
        },
        std::io::ErrorKind::PermissionDenied => VfsError::PermissionDenied {
            path: path.to_string_lossy().to_string(),
        },
        _ => e.into(),
    }
}

impl VirtualFileSystem for NativeFileSystem {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| map_io(path, e))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| map_io(parent, e))?;
            }
        }
        std::fs::write(path, content).map_err(|e| map_io(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> VfsResult<()> {
        std::fs::create_dir_all(path).map_err(|e| map_io(path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        std::fs::rename(from, to).map_err(|e| map_io(from, e))
    }

    fn remove_dir_all(&self, path: &Path) -> VfsResult<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_native_read_write_creates_parents() {
        let fs = NativeFileSystem::new();
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("rw");
        let file = root.join("nested/dir/out.js");

        fs.write_file(&file, b"hello native").unwrap();
        assert_eq!(fs.read_file(&file).unwrap(), b"hello native");
        assert!(fs.is_dir(&root.join("nested")));

        fs.remove_dir_all(&root).unwrap();
        assert!(!fs.exists(&root));
    }

    #[test]
    fn test_native_rename() {
        let fs = NativeFileSystem::new();
        let temp = TempDir::new().unwrap();

        let tmp = temp.path().join("entry.json.tmp");
        let dest = temp.path().join("entry.json");
        fs.write_file(&tmp, b"{}").unwrap();
        fs.rename(&tmp, &dest).unwrap();

        assert!(!fs.exists(&tmp));
        assert_eq!(fs.read_file(&dest).unwrap(), b"{}");
    }

    #[test]
    fn test_native_read_nonexistent() {
        let fs = NativeFileSystem::new();
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nonexistent");

        let result = fs.read_file(&missing);
        assert!(matches!(result, Err(VfsError::NotFound { .. })));
        assert!(!fs.is_file(&missing));
        assert!(!fs.is_dir(&missing));
    }

    #[test]
    fn test_native_remove_missing_dir_is_ok() {
        let fs = NativeFileSystem::new();
        let temp = TempDir::new().unwrap();
        assert!(fs.remove_dir_all(&temp.path().join("never_created")).is_ok());
    }
}
