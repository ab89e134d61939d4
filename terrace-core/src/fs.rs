//! Blueprint filesystem
//!
//! Blueprints reference template files (`file:` executions and `include` calls)
//! relative to the blueprint root. The pipeline only ever reads, so the
//! abstraction is a single method.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Read-only view of a blueprint's files
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Reads the whole file at `path`, relative to the blueprint root
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Normalizes a blueprint-relative path and rejects escapes out of the root
fn normalize(path: &str) -> io::Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        format!("path {:?} escapes the blueprint root", path),
                    ));
                }
            }
            Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path {:?} is not a blueprint path", path),
                ));
            }
        }
    }
    Ok(normalized)
}

/// In-memory filesystem, mostly used for inline blueprints and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryFs {
    /// Creates an empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, replacing any previous content
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    /// Adds a file in place
    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        if let Ok(key) = normalize(path) {
            self.files.insert(key, content.into());
        }
    }
}

impl FileSystem for MemoryFs {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let key = normalize(path)?;
        self.files.get(&key).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("file {:?} not found", path))
        })
    }
}

/// Filesystem rooted at a local directory
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    /// Creates a filesystem rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSystem for DirFs {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let relative = normalize(path)?;
        std::fs::read(self.root.join(relative))
    }
}
