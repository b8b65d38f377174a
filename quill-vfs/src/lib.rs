//! Quill Virtual File System
//!
//! A virtual file system abstraction with multiple backend implementations.
//! The compiler reads sources, mirrors remote modules and persists its
//! artifact cache exclusively through [`VirtualFileSystem`], so tests can run
//! whole compilations against a [`MemoryFileSystem`].
//!
//! # Usage
//! ```rust
//! use quill_vfs::{VirtualFileSystem, MemoryFileSystem};
//! use std::path::Path;
//!
//! let fs = MemoryFileSystem::new();
//! fs.write_file(Path::new("/test.txt"), b"hello").unwrap();
//! let content = fs.read_file(Path::new("/test.txt")).unwrap();
//! assert_eq!(content, b"hello");
//! ```

mod error;
mod memory;
mod native;
mod r#trait;

pub use error::{VfsError, VfsResult};
pub use memory::MemoryFileSystem;
pub use native::NativeFileSystem;
pub use r#trait::VirtualFileSystem;

/// Create a new memory-based file system.
pub fn memory_fs() -> MemoryFileSystem {
    MemoryFileSystem::new()
}

/// Create a new native file system.
pub fn native_fs() -> NativeFileSystem {
    NativeFileSystem::new()
}
